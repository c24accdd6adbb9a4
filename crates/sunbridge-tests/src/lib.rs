// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # sunbridge-tests
//!
//! Shared mocks, builders, and fixtures for the integration test suite.

pub mod common;
