//! Collaborator bindings for the ticket purchase engine.

pub mod dcr;
