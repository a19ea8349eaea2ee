use serde::{Deserialize, Serialize};

/// Execution counters of a single warp.
///
/// Counters only ever increase while the simulation runs.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warp {
    pub core_id: usize,
    pub warp_id: usize,
    pub steps: u64,
    pub instructions: u64,
    pub loads: u64,
    pub stores: u64,
}

impl Warp {
    #[must_use]
    pub fn new(core_id: usize, warp_id: usize) -> Self {
        Self {
            core_id,
            warp_id,
            ..Self::default()
        }
    }
}

impl std::ops::AddAssign<&Warp> for Warp {
    fn add_assign(&mut self, other: &Warp) {
        self.steps += other.steps;
        self.instructions += other.instructions;
        self.loads += other.loads;
        self.stores += other.stores;
    }
}

impl std::fmt::Display for Warp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Steps : {}", self.steps)?;
        writeln!(f, "Insts : {}", self.instructions)?;
        writeln!(f, "Loads : {}", self.loads)?;
        write!(f, "Stores: {}", self.stores)
    }
}
