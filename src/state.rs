// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::service::AttestationService;

/// Context shared by all HTTP handlers, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub service: AttestationService,
}

impl AppState {
    pub fn new(service: AttestationService) -> Self {
        Self { service }
    }
}
