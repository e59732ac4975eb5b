//! Form runtime for Ringi
//!
//! Pure, side-effect-free operations over the form model:
//!
//! - [`aggregator`] — folds flat responses back into structured,
//!   duplicate-grouped sections for display and processing
//! - [`sections`] — manages the live instances of a duplicatable
//!   section and its shared option pool while a request is edited
//!
//! Nothing here touches storage; callers hand in schema snapshots and
//! response lists and get values or typed errors back. Reads may run
//! with unlimited concurrency.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod sections;

pub use aggregator::{aggregate, flatten, AggregatedField, AggregatedSection};
pub use sections::SectionInstances;
