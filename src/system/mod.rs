//! Host system plumbing: kernel queries, device enumeration, declarative
//! network files, systemd and process control.

/// Device enumeration over sysfs and the USB tree.
pub mod devices;
/// Kernel state queries and mutations over rtnetlink.
pub mod netlink;
/// Declarative network file writer.
pub mod networkd;
/// Process lookup and termination helpers.
pub mod process;
/// systemd service control and networkctl queries.
pub mod systemd;
