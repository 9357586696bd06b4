// ABOUTME: Library root re-exporting server modules for integration testing
// ABOUTME: Enables tests/ to access router, state, configuration, and handler modules
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

pub mod config;
pub mod error;
pub mod health;
pub mod query;
pub mod router;
pub mod state;
pub mod stats;
