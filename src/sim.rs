use crate::{
    config::Arch,
    core::Core,
    decode::Decoder,
    memory, trace,
    warp::{self, Warp},
};
use console::style;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Step(#[from] warp::Error),
    #[error("still running after {rounds} rounds")]
    BudgetExhausted { rounds: u64 },
}

/// Runs all cores round-robin until no thread is active.
///
/// Every round visits the cores in ascending id order and steps those that are running.
/// Execution is single-threaded, so a run is fully determined by the image and the
/// architecture.
#[derive(Debug)]
pub struct Driver<M> {
    arch: Arc<Arch>,
    cores: Vec<Core>,
    memory: M,
    decoder: Decoder,
    rounds: u64,
}

impl<M> Driver<M>
where
    M: memory::Port,
{
    pub fn new(arch: Arch, memory: M) -> Self {
        let arch = Arc::new(arch);
        let cores = (0..arch.num_cores)
            .map(|core_id| Core::new(core_id, Arc::clone(&arch)))
            .collect();
        let decoder = Decoder::new(&arch);
        Self {
            arch,
            cores,
            memory,
            decoder,
            rounds: 0,
        }
    }

    #[must_use]
    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    #[must_use]
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    #[must_use]
    pub fn core(&self, core_id: usize) -> Option<&Core> {
        self.cores.get(core_id)
    }

    pub fn core_mut(&mut self, core_id: usize) -> Option<&mut Core> {
        self.cores.get_mut(core_id)
    }

    pub fn warps(&self) -> impl Iterator<Item = &Warp> + '_ {
        self.cores.iter().flat_map(Core::warps)
    }

    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_memory(self) -> M {
        self.memory
    }

    /// Number of completed rounds in which at least one core was running.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.cores.iter().any(Core::running)
    }

    /// Raise an interrupt on a warp.
    ///
    /// Returns `false` if the warp does not exist or the interrupt was dropped.
    pub fn interrupt(&mut self, core_id: usize, warp_id: usize, cause: u64) -> bool {
        let taken = self
            .cores
            .get_mut(core_id)
            .is_some_and(|core| core.interrupt(warp_id, cause));
        log::debug!("interrupt {cause:#x} on core {core_id} warp {warp_id}: taken={taken}");
        taken
    }

    /// Step every running core once.
    ///
    /// Returns whether any core was running.
    pub fn round(&mut self, trace: &mut dyn trace::Sink) -> Result<bool, Error> {
        let mut running = false;
        for core in &mut self.cores {
            if !core.running() {
                continue;
            }
            running = true;
            core.step(&mut self.memory, &self.decoder, trace)?;
        }
        if running {
            self.rounds += 1;
        }
        Ok(running)
    }

    /// Run until all warps have halted.
    pub fn run(&mut self) -> Result<stats::Sim, Error> {
        self.run_with_budget(None)
    }

    /// Run until all warps have halted or `max_rounds` rounds have completed.
    ///
    /// Running out of rounds is an error.
    pub fn run_with_budget(&mut self, max_rounds: Option<u64>) -> Result<stats::Sim, Error> {
        self.run_traced(max_rounds, &mut trace::Noop)
    }

    pub fn run_traced(
        &mut self,
        max_rounds: Option<u64>,
        trace: &mut dyn trace::Sink,
    ) -> Result<stats::Sim, Error> {
        log::info!("running {}", self.arch);
        let start = std::time::Instant::now();
        loop {
            if max_rounds.is_some_and(|max| self.rounds >= max) && self.running() {
                return Err(Error::BudgetExhausted {
                    rounds: self.rounds,
                });
            }
            if !self.round(trace)? {
                break;
            }
        }
        log::info!(
            "completed after {} rounds in {:?}",
            self.rounds,
            start.elapsed()
        );
        Ok(self.stats())
    }

    #[must_use]
    pub fn stats(&self) -> stats::Sim {
        stats::Sim {
            rounds: self.rounds,
            warps: self.warps().map(|warp| warp.stats().clone()).collect(),
        }
    }

    pub fn print_stats(&self) {
        for core in &self.cores {
            core.print_stats();
        }
        let stats = self.stats();
        println!(
            "{}",
            style(format!("total ({} rounds)", stats.rounds)).bold()
        );
        println!("{}", stats.total());
    }
}
