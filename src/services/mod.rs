//! Link supervisors and the connection manager.

/// Shared supervisor machinery and link data types.
pub mod common;
/// Wired LAN link supervisor.
pub mod lan;
/// LTE (PPP) link supervisor.
pub mod lte;
/// Connection manager and online probe.
pub mod manager;
/// Wi-Fi access point supervisor.
pub mod wifi_ap;
/// Wi-Fi client supervisor.
pub mod wifi_client;
