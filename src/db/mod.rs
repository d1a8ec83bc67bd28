mod connection;
mod memory;
mod postgres;
mod store;
mod value;

pub use connection::*;
pub use memory::*;
pub use postgres::*;
pub use store::*;
pub use value::*;
