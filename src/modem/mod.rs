//! AT modem and PPP dial subsystem.

/// AT command client over a serial port.
pub mod client;
/// Built-in modem port-layout definitions.
pub mod defs;
/// Line-oriented AT response parser.
pub mod parser;
/// PPP dial session around a pppd child.
pub mod ppp;

pub use client::AtModem;
pub use parser::AtParser;
pub use ppp::PppSession;
