//! Kernel networking state over rtnetlink.
//!
//! Every operation opens its own netlink connection, swallows kernel-side
//! errors and returns an empty answer. Supervisors poll these from their
//! reconcile loops; a lost answer only delays the next observation by one
//! iteration.

use std::net::{IpAddr, Ipv4Addr};

use futures::TryStreamExt;
use netlink_packet_route::AddressFamily;
use netlink_packet_route::address::AddressAttribute;
use netlink_packet_route::link::{LinkAttribute, State};
use netlink_packet_route::route::{RouteAddress, RouteAttribute};
use rtnetlink::{Handle, LinkUnspec, RouteMessageBuilder, new_connection};
use serde::Serialize;

/// Active outbound interface and its gateway, or both empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefaultRoute {
    /// Interface name the default route exits through.
    pub ifname: Option<String>,
    /// Gateway address of the default route.
    pub ip: Option<String>,
}

async fn open() -> Option<Handle> {
    let (conn, handle, _) = new_connection().ok()?;
    tokio::spawn(conn);
    Some(handle)
}

async fn link_index(handle: &Handle, ifname: &str) -> Option<u32> {
    let link = handle
        .link()
        .get()
        .match_name(ifname.to_string())
        .execute()
        .try_next()
        .await
        .ok()
        .flatten()?;
    Some(link.header.index)
}

/// Candidate default route as mined from a route message.
type RouteCandidate = (u32, u32, Option<Ipv4Addr>);

/// Pick the candidate with the lowest priority; ties keep the earlier one.
fn pick_default(candidates: impl IntoIterator<Item = RouteCandidate>) -> Option<(u32, Option<Ipv4Addr>)> {
    let mut best: Option<RouteCandidate> = None;
    for (prio, oif, gw) in candidates {
        if best.map_or(true, |(p, _, _)| prio < p) {
            best = Some((prio, oif, gw));
        }
    }
    best.map(|(_, oif, gw)| (oif, gw))
}

/// Query the kernel's lowest-metric IPv4 default route.
pub async fn default_route() -> DefaultRoute {
    let Some(handle) = open().await else {
        return DefaultRoute::default();
    };

    let mut candidates = Vec::new();
    let mut routes = handle
        .route()
        .get(RouteMessageBuilder::<Ipv4Addr>::new().build())
        .execute();
    while let Some(msg) = routes.try_next().await.ok().flatten() {
        if msg.header.destination_prefix_length != 0 {
            continue;
        }
        let mut prio = 0u32;
        let mut oif = None;
        let mut gw = None;
        for attr in &msg.attributes {
            match attr {
                RouteAttribute::Priority(p) => prio = *p,
                RouteAttribute::Oif(i) => oif = Some(*i),
                RouteAttribute::Gateway(RouteAddress::Inet(ip)) => gw = Some(*ip),
                _ => {}
            }
        }
        if let Some(oif) = oif {
            candidates.push((prio, oif, gw));
        }
    }

    let Some((oif, gw)) = pick_default(candidates) else {
        return DefaultRoute::default();
    };

    let mut links = handle.link().get().execute();
    while let Some(link) = links.try_next().await.ok().flatten() {
        if link.header.index == oif {
            let ifname = link.attributes.iter().find_map(|a| match a {
                LinkAttribute::IfName(name) => Some(name.clone()),
                _ => None,
            });
            return DefaultRoute {
                ifname,
                ip: gw.map(|g| g.to_string()),
            };
        }
    }

    DefaultRoute::default()
}

/// First IPv4 address on the interface in `a.b.c.d/prefix` form.
pub async fn address(ifname: &str) -> Option<String> {
    let handle = open().await?;
    let index = link_index(&handle, ifname).await?;

    let mut addrs = handle
        .address()
        .get()
        .set_link_index_filter(index)
        .execute();
    while let Some(msg) = addrs.try_next().await.ok().flatten() {
        if msg.header.family != AddressFamily::Inet {
            continue;
        }
        let prefix = msg.header.prefix_len;
        for attr in &msg.attributes {
            if let AddressAttribute::Local(IpAddr::V4(ip)) = attr {
                return Some(format!("{ip}/{prefix}"));
            }
        }
    }
    None
}

/// `IFLA_OPERSTATE` of the interface (`UP`, `DOWN`, `UNKNOWN`, ...).
pub async fn operstate(ifname: &str) -> Option<String> {
    let handle = open().await?;
    let link = handle
        .link()
        .get()
        .match_name(ifname.to_string())
        .execute()
        .try_next()
        .await
        .ok()
        .flatten()?;

    link.attributes.iter().find_map(|a| match a {
        LinkAttribute::OperState(state) => Some(operstate_str(state).to_string()),
        _ => None,
    })
}

fn operstate_str(state: &State) -> &'static str {
    match state {
        State::Up => "UP",
        State::Down => "DOWN",
        State::Dormant => "DORMANT",
        State::Testing => "TESTING",
        State::NotPresent => "NOTPRESENT",
        State::LowerLayerDown => "LOWERLAYERDOWN",
        _ => "UNKNOWN",
    }
}

/// Flush all addresses on the interface and set the link down.
///
/// Never errors out; a missing interface is a no-op.
pub async fn iface_down(ifname: &str) {
    let Some(handle) = open().await else {
        return;
    };
    let Some(index) = link_index(&handle, ifname).await else {
        return;
    };

    let mut addrs = Vec::new();
    let mut stream = handle
        .address()
        .get()
        .set_link_index_filter(index)
        .execute();
    while let Some(msg) = stream.try_next().await.ok().flatten() {
        addrs.push(msg);
    }
    for msg in addrs {
        let _ = handle.address().del(msg).execute().await;
    }

    let _ = handle
        .link()
        .set(LinkUnspec::new_with_index(index).down().build())
        .execute()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_default_prefers_lowest_priority() {
        let picked = pick_default([(1024, 2, None), (512, 3, Some(Ipv4Addr::new(10, 0, 0, 1)))]);

        assert_eq!(picked, Some((3, Some(Ipv4Addr::new(10, 0, 0, 1)))));
    }

    #[test]
    fn pick_default_ties_keep_enumeration_order() {
        let picked = pick_default([(0, 7, None), (0, 8, None)]);

        assert_eq!(picked, Some((7, None)));
    }

    #[test]
    fn pick_default_empty() {
        assert_eq!(pick_default([]), None);
    }
}
