//! Carrier master math utilities.

pub mod math;

pub use math::logistic::{LogisticModel, TrainOptions};
pub use math::stable::*;
pub use math::stats::{mean, median, std_dev, Standardizer};
