pub mod decoder;
pub mod entropy;
pub mod idct;
pub mod macroblock;
pub mod tables;

pub use decoder::*;
pub use entropy::*;
pub use idct::*;
pub use macroblock::*;
pub use tables::*;
