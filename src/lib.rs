//! Core library for the autoshop-reports command line application.
//!
//! The library loads snapshots of an auto repair shop's requests, narrows and
//! orders them for display, and renders them into report documents. Shop
//! entities and their derived values live under [`autoshop::model`], the
//! request list engine in [`autoshop::select`], report assembly in
//! [`autoshop::report`] with one writer per format under [`autoshop::io`], and
//! image storage in [`autoshop::resources`].

pub mod autoshop;

pub use autoshop::{
    FailureReason, ReportError, Result, error, io, model, report, resources, select, settings,
};
