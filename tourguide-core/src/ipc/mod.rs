//! Types serialised for host UIs (JSON over whatever bus the host uses).
//!
//! All types derive `serde::Serialize` + `serde::Deserialize`.

pub mod events;
