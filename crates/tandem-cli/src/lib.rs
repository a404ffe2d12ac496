// Copyright 2025 Tandem Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Tandem CLI
//!
//! Command-line interface for running and exercising a Tandem server.
//!
//! ## Key Commands
//!
//! - `tandem serve`: Start the batched procedure endpoint
//! - `tandem call`: Call one procedure over HTTP (outputs raw JSON for scripting)
//! - `tandem render`: Server-render the status page with its hydration snapshot
//!
//! ## Architecture
//!
//! The CLI uses `argh` for argument parsing and dispatches to `tandem-server`,
//! `tandem-client` and `tandem-hydrate`. The [`page`] module holds the one
//! server-rendered page the binary knows how to produce.

pub mod page;
