//! Charm identity and the marker file that records it.
//!
//! A charm directory carries a `.juju-charm` file naming the charm whose
//! files it holds. Comparing it against the intended charm tells the agent
//! whether the deployed state has drifted.

mod marker;
mod url;

pub use marker::{CHARM_URL_FILE, read_charm_url, write_charm_url};
pub use url::{CharmUrl, CharmUrlError, Schema};
