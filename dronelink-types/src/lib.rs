pub mod error;
pub mod navdata;
pub mod picture;

pub use error::*;
pub use navdata::*;
pub use picture::*;
