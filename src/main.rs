// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;

use ruta_salud_lib::engine::FileSources;
use ruta_salud_lib::matching::embedding::HashedEmbedder;
use ruta_salud_lib::{EngineConfig, GeoPoint, RecommendationEngine, RecommendationRequest};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let start_time = Instant::now();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 6 {
        eprintln!(
            "usage: ruta_salud <data-dir> <category> <triage-level> <specialty> <department> <municipality> [lat lng]"
        );
        std::process::exit(2);
    }

    let data_dir = PathBuf::from(&args[0]);
    let sources = FileSources {
        providers: data_dir.join("prestadores_mapa.json"),
        urgent_providers: data_dir.join("prestadores_urg.json"),
        triage_rules: data_dir.join("triage_sintomas.json"),
    };

    let user_location = match (args.get(6), args.get(7)) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(
            lat.parse().context("latitude must be a number")?,
            lng.parse().context("longitude must be a number")?,
        )),
        _ => None,
    };

    let engine = RecommendationEngine::new(
        EngineConfig::default(),
        Arc::new(sources),
        Arc::new(HashedEmbedder::new()),
    );

    let request = RecommendationRequest {
        category: args[1].clone(),
        triage_level: args[2].clone(),
        specialty: args[3].clone(),
        department: args[4].clone(),
        municipality: args[5].clone(),
        user_location,
        max_distance_km: None,
    };

    let recommendation = engine
        .recommend(&request)
        .await
        .context("recommendation failed")?;

    if !recommendation.has_providers() {
        info!("no providers matched the query");
    }
    println!("{}", serde_json::to_string_pretty(&recommendation)?);

    let (directory_info, correspondence_info) = engine.cache_info().await;
    if let (Some(dir), Some(corr)) = (directory_info, correspondence_info) {
        info!(
            "caches: directory build {} at {}, correspondence build {} at {}",
            dir.build_id, dir.built_at, corr.build_id, corr.built_at
        );
    }
    info!("completed in {:.2?}", start_time.elapsed());
    Ok(())
}
