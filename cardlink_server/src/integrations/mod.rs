pub mod ranking;

pub use ranking::{RankingBackend, RankingClient};
