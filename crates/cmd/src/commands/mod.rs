// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod clone;
pub mod export;
pub mod import;
pub mod schema;

pub use clone::{CloneSummary, clone_command};
pub use export::export_command;
pub use import::import_command;
pub use schema::{schema_export_command, schema_import_command};
