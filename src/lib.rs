// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Polls a fleet of full nodes and detects divergences between their views of the chain.

/// Module containing the shared block graph and the ancestry resolver.
pub mod chain;
/// Module containing the settings of the polling loop.
pub mod config;
/// Module that contains the MongoDB store.
pub mod db;
/// Module containing the detectors that run after each poll cycle.
pub mod detect;
/// Module that contains the tracked entities.
pub mod model;
/// Module containing the notification boundary.
pub mod notify;
/// Module containing the poll cycle sequencing.
pub mod orchestrator;
/// Module containing the per-peer poller.
pub mod poller;
/// Module containing the peer RPC client.
pub mod rpc;
/// Module containing cooperative shutdown handles.
pub mod shutdown;
/// Module containing the persistence boundary.
pub mod store;
