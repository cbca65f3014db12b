use anyhow::{Context, Result};
use log::LevelFilter;
use nalgebra::Point3;

use raynav::histories::run_histories;
use raynav::settings;
use raynav::{FacetKernel, Model, NavigationContext};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let settings = settings::load_config()?;
    log::info!("{}", settings);

    let model = Model::initialize(
        FacetKernel::new(),
        &settings.model,
        settings.facet_tolerance,
        settings.properties.clone(),
    )
    .with_context(|| format!("failed to initialize {}", settings.model.display()))?;

    let mut nav = NavigationContext::new(model);
    nav.enable_thread_support(settings.threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads)
        .build()
        .context("failed to build the worker pool")?;

    let [x, y, z] = settings.source;
    let summary = pool.install(|| {
        run_histories(
            &nav,
            &Point3::new(x, y, z),
            settings.histories,
            settings.seed,
            settings.use_cell_cache,
        )
    })?;

    println!("{}", summary);
    Ok(())
}
