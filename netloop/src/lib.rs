#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use netloop_common::{unix_micros, JoinMap};
pub use netloop_control::*;
pub use netloop_io as io;
