use crate::{
    config::Arch,
    decode, memory, trace,
    warp::{self, Spawn, Warp},
};
use console::style;
use std::sync::Arc;

/// A core owning a fixed set of warps.
///
/// Warp 0 starts at the reset pc, all other warps wait to be spawned.
#[derive(Debug, Clone)]
pub struct Core {
    id: usize,
    arch: Arc<Arch>,
    warps: Vec<Warp>,
}

impl Core {
    #[must_use]
    pub fn new(id: usize, arch: Arc<Arch>) -> Self {
        let warps = (0..arch.num_warps)
            .map(|warp_id| {
                let mut warp = Warp::new(id, warp_id, Arc::clone(&arch));
                if warp_id > 0 {
                    warp.park();
                }
                warp
            })
            .collect();
        Self { id, arch, warps }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    /// Whether any warp has an active thread.
    #[must_use]
    pub fn running(&self) -> bool {
        self.warps.iter().any(Warp::active)
    }

    #[must_use]
    pub fn num_active_warps(&self) -> usize {
        self.warps.iter().filter(|warp| warp.active()).count()
    }

    #[must_use]
    pub fn warps(&self) -> &[Warp] {
        &self.warps
    }

    #[must_use]
    pub fn warp(&self, warp_id: usize) -> Option<&Warp> {
        self.warps.get(warp_id)
    }

    pub fn warp_mut(&mut self, warp_id: usize) -> Option<&mut Warp> {
        self.warps.get_mut(warp_id)
    }

    /// Give every warp one step, in ascending warp id order.
    ///
    /// Warps spawned by a step are dispatched before the next warp steps.
    pub fn step(
        &mut self,
        memory: &mut dyn memory::Port,
        decoder: &dyn decode::Decode,
        trace: &mut dyn trace::Sink,
    ) -> Result<(), warp::Error> {
        for warp_id in 0..self.warps.len() {
            let spawn = self.warps[warp_id].step(memory, decoder, trace)?;
            if let Some(spawn) = spawn {
                self.spawn(warp_id, spawn);
            }
        }
        Ok(())
    }

    fn spawn(&mut self, issuer: usize, Spawn { count, pc }: Spawn) {
        let count = usize::try_from(count)
            .map_or(self.warps.len(), |count| count.min(self.warps.len()));
        let mut spawned = 0;
        for warp in self.warps.iter_mut().take(count).skip(1) {
            if warp.spawn(pc) {
                spawned += 1;
            }
        }
        log::debug!(
            "{}",
            style(format!(
                "core {} warp {} spawned {} warps at pc {:#x}",
                self.id, issuer, spawned, pc
            ))
            .cyan()
        );
    }

    /// Raise an interrupt on `warp_id`.
    ///
    /// Returns `false` if the warp does not exist or is already handling an interrupt.
    pub fn interrupt(&mut self, warp_id: usize, cause: u64) -> bool {
        self.warps
            .get_mut(warp_id)
            .is_some_and(|warp| warp.interrupt(cause))
    }

    pub fn stats(&self) -> impl Iterator<Item = &stats::Warp> + '_ {
        self.warps.iter().map(Warp::stats)
    }

    pub fn print_stats(&self) {
        for warp in &self.warps {
            warp.print_stats();
        }
    }
}
