// ABOUTME: Configuration module organizing environment-driven settings
// ABOUTME: Exposes the server-wide configuration loaded at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Configuration management.

/// Environment-based configuration for deployments
pub mod environment;

pub use environment::ServerConfig;
