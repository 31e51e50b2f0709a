//! Audit kernel math utilities.

pub mod math;

pub use math::benford;
pub use math::decay::*;
pub use math::digits::*;
pub use math::moments::*;
pub use math::robust::*;
