pub mod io;
pub mod structs;
pub mod structured;


pub use io::*;
pub use structs::*;
pub use structured::*;
