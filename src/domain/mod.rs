//! Domain Layer
//!
//! Value objects, entities, ports and pure services for backend discovery.

pub mod entities;
pub mod ports;
pub mod services;
pub mod value_objects;
