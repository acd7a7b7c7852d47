//! Resource data model.
//!
//! This module defines what a managed studio looks like on both sides of a
//! reconciliation: the desired configuration a user declares, the observed
//! state reported by the control plane, tag diffs, and the lifecycle state
//! machine that governs which mutations may run.

mod attributes;
mod changes;
mod lifecycle;
mod observed;
mod tags;

pub use attributes::{
    ATTR_AUTH_MODE, ATTR_DEFAULT_S3_LOCATION, ATTR_DESCRIPTION, ATTR_ENGINE_SG,
    ATTR_IDP_AUTH_URL, ATTR_IDP_RELAY_STATE, ATTR_NAME, ATTR_SERVICE_ROLE, ATTR_SUBNET_IDS,
    ATTR_USER_ROLE, ATTR_VPC_ID, ATTR_WORKSPACE_SG, AttributeSchema, AttributeSpec,
    AttributeValue, DesiredConfiguration, Mutability,
};
pub use changes::ChangeSet;
pub use lifecycle::{InFlightGuard, InFlightRegistry, LifecycleState, Mutation};
pub use observed::{ObservedState, RemoteStatus, ResourceId};
pub use tags::{TagDiff, TagSet};
