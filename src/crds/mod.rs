pub mod sagafinder;

pub use sagafinder::*;
