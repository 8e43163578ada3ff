//! Storage areas
//!
//! - `database`: loose object store
//! - `refs`: ref files with compare-and-swap updates and reflogs
//! - `repository`: a bare repository opened under a project name
//! - `repository_manager`: opens repositories by project
//! - `ref_updater`: ref updates made by batch operations, with notifications
//! - `batch_store`: versioned batch records

pub mod batch_store;
pub mod database;
pub mod ref_updater;
pub mod refs;
pub mod repository;
pub mod repository_manager;
