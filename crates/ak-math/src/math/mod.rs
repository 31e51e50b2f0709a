//! Core math modules.

pub mod benford;
pub mod decay;
pub mod digits;
pub mod moments;
pub mod robust;
