//! Capability resolution over the agent tree.
//!
//! Two resolvers answer the same question ("which agent can supply this
//! key?") under different constraints:
//!
//! - [`CapabilityResolver`] walks an in-process [`AgentRegistry`]
//!   synchronously: full pre-order search below the start node, then a
//!   sibling-only scan on the way up.
//! - [`distributed`] runs the search as a message-driven state machine for
//!   when every registry predicate is itself a round trip.  The actor never
//!   waits on a reply; each in-flight request is a stored `SearchState`
//!   resumed by the reply carrying its correlation token.
//!
//! # Data flow (distributed)
//!
//! ```text
//! caller ──RouteDataQuery──▶ DistributedResolutionActor ──RegistryQuery{token}──▶ RegistryActor
//!    ▲                              │   ▲                                              │
//!    │                              │   └────────RegistryResponse{token}───────────────┘
//!    └───────ResolutionReply────────┘
//! ```

pub mod capability;
pub mod distributed;
pub mod registry;
pub mod registry_actor;
pub mod retry;

pub use capability::CapabilityResolver;
pub use distributed::{
    spawn_resolver, ReplyTo, Requester, ResolverHandle, ResolverMessage, ResolverStats,
    RouteDataQuery,
};
pub use registry::{AgentDescriptor, AgentInfo, AgentRegistry, InMemoryRegistry};
pub use registry_actor::{spawn_registry, RegistryMailbox, RegistryRequest};
pub use retry::RetryPolicy;
