#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for geotrack.
//!
//! Configuration comes from the environment: `GEOTRACK_CONFIG`,
//! `GEOTRACK_BACKEND`, `GEOTRACK_DATA_DIR`, `GEOTRACK_ID_POLICY`,
//! `BIND_ADDR` and `PORT`.

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    geotrack_server::run_server().await
}
