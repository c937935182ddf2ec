//! Call-site registry.
//!
//! Every lexically distinct call site needs its own estimator, created
//! lazily and living for the rest of the process. Clients that cannot
//! hold a `static` control themselves intern a site name here; repeated
//! lookups under the same name return the same control (and therefore the
//! same estimator).

use crate::cstmt::ByPrediction;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref SITES: Mutex<HashMap<String, Arc<ByPrediction>>> = Mutex::new(HashMap::new());
}

/// Interns `name`, creating the control (and estimator) on first use.
pub fn controller(name: &str) -> Arc<ByPrediction> {
    let mut sites = SITES.lock().unwrap();
    if let Some(ctrl) = sites.get(name) {
        return Arc::clone(ctrl);
    }
    let ctrl = Arc::new(ByPrediction::new(name));
    sites.insert(name.to_string(), Arc::clone(&ctrl));
    ctrl
}

/// Interns a (name, id) pair, for callers that reuse one tag across
/// several distinct sites.
pub fn controller_with_id(name: &str, id: u32) -> Arc<ByPrediction> {
    controller(&format!("{}#{}", name, id))
}

/// Expands to a site name unique to the enclosing source location.
#[macro_export]
macro_rules! site_name {
    () => {
        concat!(module_path!(), ":", line!(), ":", column!())
    };
}
