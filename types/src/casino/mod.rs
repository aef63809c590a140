//! Casino domain types.
//!
//! Defines account/transaction/round/treasury/config state and constants used by the execution
//! layer and services.

mod account;
mod audit;
mod codec;
mod config;
mod constants;
mod economy;
mod round;
mod table;

pub use account::*;
pub use audit::*;
pub use codec::{
    opt_string_encode_size, read_opt_string, read_string, string_encode_size, write_opt_string,
    write_string,
};
pub use config::*;
pub use constants::*;
pub use economy::*;
pub use round::*;
pub use table::*;
