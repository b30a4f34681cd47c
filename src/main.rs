// Probe driver: runs every demo model over the corpus at all depths,
// then compares the persisted summaries and prints both metric columns.
// Corpus and results folders come from the command line, with the layout
// the repo ships (`data/4test`, `results/test`) as the default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wavelet_probe::core_modules::model_loader::{demo_model_set, load_models};
use wavelet_probe::{
    ClassifierProcessor, HaarCoder, Interpolation, ProcessorConfig, Reducer, ResultManager,
    SIMILAR_BEST_CLASS, SIMILAR_CLASSES_PCT,
};

#[tokio::main]
async fn main() -> wavelet_probe::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let data_folder = PathBuf::from(args.next().unwrap_or_else(|| "data/4test".to_string()));
    let results_folder = PathBuf::from(args.next().unwrap_or_else(|| "results/test".to_string()));

    let classifiers = load_models(demo_model_set());
    let names: Vec<String> = classifiers.iter().map(|(name, _)| name.clone()).collect();

    let transform_depth = 5;
    let config = ProcessorConfig {
        data_folder,
        results_folder: results_folder.clone(),
        transform_depth,
        top_classes: 5,
        interpolation: Interpolation::Triangle,
        workers: 1,
    };
    let result_manager = ResultManager::new();
    let processor = ClassifierProcessor::new(config, Arc::new(HaarCoder::new()), result_manager)?;

    let processed = processor
        .process_classifiers(classifiers, Duration::from_secs(100))
        .await?;
    for (name, summaries) in &processed {
        println!(
            "{name}: {:?} ({} images per depth)",
            summaries[0].status,
            summaries[0].results.len()
        );
    }

    let comparison = result_manager.compare_summaries(
        &results_folder,
        &names,
        &[transform_depth],
        Reducer::Mean,
    )?;
    let (names, similar_classes_pct) =
        result_manager.extract_from_comparison(&comparison, SIMILAR_CLASSES_PCT)?;
    let (_, similar_best_class) =
        result_manager.extract_from_comparison(&comparison, SIMILAR_BEST_CLASS)?;

    println!("\n{:<20} {:>20} {:>20}", "classifier", SIMILAR_CLASSES_PCT, SIMILAR_BEST_CLASS);
    for ((name, pct), best) in names.iter().zip(&similar_classes_pct).zip(&similar_best_class) {
        println!("{name:<20} {pct:>20.1} {best:>20.2}");
    }
    Ok(())
}
