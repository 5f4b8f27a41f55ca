//! Wire-format messages exchanged by the gossip protocol.
//!
//! Maintained by hand in the shape `prost-build` emits, so the schema can move
//! to generated code without touching call sites. The engine treats
//! [`gossip::v1::GossipKeyValue::value`] as opaque bytes; well-known payload
//! types ([`gossip::v1::ClusterTopology`], [`gossip::v1::MemberHeartbeat`])
//! are decoded only by typed accessors and consensus extractors.

pub mod gossip {
    pub mod v1 {
        use std::collections::HashMap;

        /// A cluster member's identity and placement. Identity is `id`;
        /// `address` and `kinds` are carried for consumers of topology events.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Member {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub address: String,
            #[prost(string, repeated, tag = "3")]
            pub kinds: Vec<String>,
        }

        /// One versioned entry. `sequence_number` is monotonic per
        /// (member, key); the higher sequence wins on merge.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct GossipKeyValue {
            #[prost(uint64, tag = "1")]
            pub sequence_number: u64,
            /// Encoded payload message; never interpreted by the engine.
            #[prost(bytes = "vec", tag = "2")]
            pub value: Vec<u8>,
        }

        /// Key/value state of a single member.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct GossipMemberState {
            #[prost(map = "string, message", tag = "1")]
            pub values: HashMap<String, GossipKeyValue>,
        }

        /// Full (or partial, when carried by a delta) view of the cluster's
        /// gossiped state, keyed by member id.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct GossipState {
            #[prost(map = "string, message", tag = "1")]
            pub members: HashMap<String, GossipMemberState>,
        }

        /// The payload gossiped under the topology key.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ClusterTopology {
            /// Order-independent fingerprint of the member id set.
            #[prost(uint64, tag = "1")]
            pub topology_hash: u64,
            #[prost(message, repeated, tag = "2")]
            pub members: Vec<Member>,
        }

        /// The payload gossiped under the heartbeat key. The payload content
        /// is incidental; the fresh sequence number each round is what keeps
        /// liveness observable.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct MemberHeartbeat {
            #[prost(uint64, tag = "1")]
            pub tick: u64,
        }
    }
}
