use log::warn;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Version recorded into every stamp.
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provenance attached to every structural record: when, where and by what
/// it was written. Not used for identity or ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub unixtime: i64,
    pub hostname: String,
    pub software_version: String,
}

impl Stamp {
    pub fn now() -> Stamp {
        Stamp {
            unixtime: OffsetDateTime::now_utc().unix_timestamp(),
            hostname: local_hostname(),
            software_version: SOFTWARE_VERSION.to_string(),
        }
    }
}

pub fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("can't get hostname: {}", e);
            String::new()
        }
    }
}
