// Testing Tools Library
//
// This crate provides testing utilities and tools for the Skaia realtime hub.
// Currently includes:
// - ws-test-client: WebSocket integration testing tool

pub mod api_client;
pub mod output;
pub mod scenarios;
pub mod ws_client;
