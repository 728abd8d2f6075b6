//! The address registry's aggregates and its read model.

pub mod access_address;
pub mod post_code;
pub mod projection;
pub(crate) mod rules;
pub mod road;
pub mod unit_address;

pub use access_address::{
    AccessAddress, AccessAddressDetails, AccessAddressEvent, AccessAddressRefs,
    AccessAddressStatus,
};
pub use post_code::{PostCode, PostCodeEvent};
pub use projection::AddressProjection;
pub use road::{Road, RoadEvent, RoadStatus};
pub use unit_address::{UnitAddress, UnitAddressDetails, UnitAddressEvent, UnitAddressStatus};
