use std::{collections::HashSet, sync::Arc, time::Duration};

use cluster_gossip::{
    gossip::Gossip,
    protos::gossip::v1::{ClusterTopology, Member, MemberHeartbeat},
    types::{BlockedMembersSupplier, GossipContext},
    utils::members_topology_hash,
};

const FANOUT: usize = 3;
const MAX_SEND: usize = 50;
const TARGET: &str = "member-1";

fn make_member(index: usize) -> Member {
    Member {
        id: format!("member-{index}"),
        address: format!("127.0.0.1:{}", 9000 + index),
        kinds: vec!["worker".to_string()],
    }
}

fn topology_of(indexes: &[usize]) -> ClusterTopology {
    let members: Vec<Member> = indexes.iter().copied().map(make_member).collect();
    ClusterTopology {
        topology_hash: members_topology_hash(&members),
        members,
    }
}

fn no_blocked() -> BlockedMembersSupplier {
    Arc::new(|| HashSet::new())
}

fn engine_with(index: usize, max_send: usize) -> Gossip {
    Gossip::new(
        GossipContext::new(format!("member-{index}")),
        FANOUT,
        max_send,
        no_blocked(),
    )
}

fn beat(tick: u64) -> MemberHeartbeat {
    MemberHeartbeat { tick }
}

// Once a delta is committed, the target is up to date and the next delta is
// empty.
#[tokio::test]
async fn test_committed_delta_leaves_nothing_to_send() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1]));

    let first = a.member_state_delta(TARGET);
    assert!(first.has_state);
    first.commit_offsets();

    let second = a.member_state_delta(TARGET);
    assert!(!second.has_state, "everything was acknowledged");
}

// A delta that is never committed is rebuilt in full on the next round, as
// if the send had never happened.
#[tokio::test]
async fn test_uncommitted_delta_is_rebuilt_in_full() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1]));
    a.set_state("load", &beat(17));

    let first = a.member_state_delta(TARGET);
    let second = a.member_state_delta(TARGET);

    assert!(second.has_state);
    assert_eq!(second.state, first.state);
}

// Committing moves the watermark past every sent entry; later deltas carry
// only newer writes.
#[tokio::test]
async fn test_delta_carries_only_entries_above_watermark() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1]));
    a.set_state("alpha", &beat(1));
    a.set_state("beta", &beat(2));

    a.member_state_delta(TARGET).commit_offsets();
    a.set_state("gamma", &beat(3));

    let delta = a.member_state_delta(TARGET);
    let own = &delta.state.members["member-0"];
    assert_eq!(own.values.len(), 1, "only the write after the commit");
    assert!(own.values.contains_key("gamma"));
}

// Deltas may be committed out of order; an older commit never rewinds the
// watermark below a newer one.
#[tokio::test]
async fn test_late_commit_does_not_lower_watermark() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1]));

    let early = a.member_state_delta(TARGET);
    a.set_state("late-key", &beat(9));
    let late = a.member_state_delta(TARGET);

    late.commit_offsets();
    early.commit_offsets();

    let next = a.member_state_delta(TARGET);
    assert!(
        !next.has_state,
        "the early commit must not resurrect already-acknowledged entries"
    );
}

// Watermarks are tracked per target; committing to one peer changes nothing
// for another.
#[tokio::test]
async fn test_watermarks_are_per_target() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1, 2]));

    a.member_state_delta("member-1").commit_offsets();

    let other = a.member_state_delta("member-2");
    assert!(other.has_state, "member-2 has not acknowledged anything");
}

// max_send caps how many members' state one delta may carry.
#[tokio::test]
async fn test_max_send_bounds_members_per_delta() {
    let a = engine_with(0, 2);
    a.update_cluster_topology(topology_of(&[0, 1, 2, 3, 4]));
    for index in 1..5 {
        let peer = engine_with(index, MAX_SEND);
        peer.update_cluster_topology(topology_of(&[index]));
        a.receive_state(peer.state_snapshot());
    }

    let delta = a.member_state_delta(TARGET);
    assert_eq!(delta.state.members.len(), 2);
}

// Under a tight cap the local member's own state goes out first.
#[tokio::test]
async fn test_own_state_is_offered_first() {
    let a = engine_with(0, 1);
    a.update_cluster_topology(topology_of(&[0, 1, 2]));
    let peer = engine_with(1, MAX_SEND);
    peer.update_cluster_topology(topology_of(&[1]));
    a.receive_state(peer.state_snapshot());

    let delta = a.member_state_delta("member-2");
    assert_eq!(delta.state.members.len(), 1);
    assert!(
        delta.state.members.contains_key("member-0"),
        "own entries take priority over relayed ones"
    );
}

// The commit belongs to the delta that carried the entries; gossiping keeps
// working while a commit is still in flight.
#[tokio::test]
async fn test_commit_is_deferred_until_caller_decides() {
    let a = engine_with(0, MAX_SEND);
    a.update_cluster_topology(topology_of(&[0, 1]));

    let delta = a.member_state_delta(TARGET);
    assert!(delta.has_state);
    assert_eq!(a.stats().committed_offsets, 0);

    tokio::time::sleep(Duration::from_millis(10)).await;
    delta.commit_offsets();
    assert_eq!(a.stats().committed_offsets, 1);
}
