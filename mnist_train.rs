//! MNIST training driver.
//!
//! Usage: `mnist_train <train.json> <architecture.json> [data_dir] [model_out]`
//!
//! Builds the network from the architecture file, or resumes from `model_out`
//! when that file already exists, trains on the MNIST training set, reports
//! accuracy on the test set and saves the model. Set `RUST_LOG=debug` for
//! per-batch progress.

use rust_cnn_engine::architecture::{build_network, load_architecture};
use rust_cnn_engine::config::load_config;
use rust_cnn_engine::eval::evaluate;
use rust_cnn_engine::model_io::{load_network, save_network};
use rust_cnn_engine::utils::mnist::{load_images, load_labels};
use rust_cnn_engine::NetworkOptions;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const TRAIN_IMAGES: &str = "train-images.idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels.idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images.idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels.idx1-ubyte";

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    if args.len() < 3 {
        return Err(format!(
            "Usage: {} <train.json> <architecture.json> [data_dir] [model_out]",
            args.first().map_or("mnist_train", String::as_str)
        )
        .into());
    }
    let config = load_config(&args[1])?;
    let architecture = load_architecture(&args[2])?;
    let data_dir = PathBuf::from(args.get(3).map_or("./data", String::as_str));
    let model_out = PathBuf::from(args.get(4).map_or("mnist_model.json", String::as_str));

    let program_start = Instant::now();
    let options = NetworkOptions::default();
    let mut network = if Path::new(&model_out).exists() {
        info!(path = %model_out.display(), "resuming from saved model");
        load_network(&model_out, options)?
    } else {
        build_network(&architecture, options)?
    };
    info!("{}", network.describe(false));

    info!(dir = %data_dir.display(), "loading MNIST");
    let classes = Some(network.output_size());
    let train_images = load_images(data_dir.join(TRAIN_IMAGES), None)?;
    let train_labels = load_labels(data_dir.join(TRAIN_LABELS), None, classes)?;
    let test_images = load_images(data_dir.join(TEST_IMAGES), None)?;
    let test_labels = load_labels(data_dir.join(TEST_LABELS), None, classes)?;
    info!(
        train = train_images.images.len(),
        test = test_images.images.len(),
        elapsed_s = program_start.elapsed().as_secs_f64(),
        "data loaded"
    );
    network.set_on_epoch_end(|epoch, loss| println!("Epoch {}: loss {:.6}", epoch + 1, loss));

    let train_start = Instant::now();
    network.train(&train_images.images, &train_labels, &config)?;
    info!(elapsed_s = train_start.elapsed().as_secs_f64(), "training finished");

    let report = evaluate(&network, &test_images.images, &test_labels)?;
    println!("Test accuracy: {:.2}% ({}/{})", report.accuracy() * 100.0, report.correct, report.total);
    for (class, row) in report.confusion.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:.3}", v)).collect();
        println!("{:>2}: {}", class, cells.join(" "));
    }

    save_network(&model_out, &network)?;
    info!(total_s = program_start.elapsed().as_secs_f64(), "done");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
