pub mod sim;
pub mod warp;

pub use sim::Sim;
pub use warp::Warp;
