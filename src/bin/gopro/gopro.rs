use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{Semaphore, SemaphorePermit};

use gopro_tools::fragment::ParseError;
use gopro_tools::metadata::concatenate;
use gopro_tools::recording::{Recording, RecordingList};
use gopro_tools::{print_bold, print_green, print_warning};

use crate::config::Config;

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:80.magenta/blue} {pos}/{len} {percent}%";

/// Main entry point for the gopro CLI.
pub async fn run(config: Config) -> Result<()> {
    let mut recordings = gather_recordings(&config).await?;

    if config.verbose {
        print_bold!("Found {} recording(s)", recordings.len());
        for recording in &recordings {
            println!(
                "  {}: {} fragment(s), expected {}",
                recording.id,
                recording.fragments.len(),
                recording.expected
            );
        }
    }

    if config.rename {
        rename_fragments(&mut recordings, &config);
    }

    if config.merge {
        merge_recordings(&recordings, &config).await?;
    }

    Ok(())
}

/// Parse and aggregate all files in the input directory.
///
/// Files are probed concurrently;
/// entries that match no grammar or cannot be probed are reported and skipped.
/// Fails when the directory cannot be listed or nothing at all was recognized.
async fn gather_recordings(config: &Config) -> Result<Vec<Recording>> {
    let names = read_entry_names(&config.input_dir).await?;

    let list = Arc::new(RecordingList::new());
    let semaphore = create_semaphore_for_io_bound();

    let progress_bar = Arc::new(ProgressBar::new(names.len() as u64));
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_BAR_TEMPLATE)?
            .progress_chars(PROGRESS_BAR_CHARS),
    );

    let tasks: Vec<_> = names
        .into_iter()
        .map(|name| {
            let list = Arc::clone(&list);
            let sem = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress_bar);
            let input_dir = config.input_dir.clone();
            tokio::spawn(async move {
                let permit: SemaphorePermit = sem.acquire().await.expect("Failed to acquire semaphore");
                let result = list.add(&input_dir, &name).await;
                drop(permit);
                progress.inc(1);
                result.err().map(|error| (name, error))
            })
        })
        .collect();

    let skipped: Vec<(String, ParseError)> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .filter_map(|result| result.expect("Parse task failed"))
        .collect();

    progress_bar.finish_and_clear();

    for (name, error) in &skipped {
        print_warning!("Skipping {name}: {error}");
    }

    let list = Arc::into_inner(list).context("Recording list still shared after parsing")?;
    if list.is_empty() {
        anyhow::bail!(
            "Input directory does not contain any recognizable recording files: '{}'",
            config.input_dir.display()
        );
    }

    Ok(list.into_recordings())
}

/// List the names of all visible files in the input directory.
async fn read_entry_names(input_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(input_dir)
        .await
        .context("Failed to read input directory")?;
    while let Some(entry) = entries.next_entry().await.context("Failed to read directory entry")? {
        if entry.path().is_file() && !gopro_tools::is_hidden(&entry) {
            names.push(gopro_tools::os_str_to_string(&entry.file_name()));
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Rename every fragment to its canonical name.
///
/// A fragment already carrying its canonical name is reported and left alone,
/// so re-running on an already-renamed directory is a no-op.
/// A failed rename is reported and does not stop the remaining fragments.
/// Renamed fragments are updated in place so a following merge
/// reads from the new locations.
fn rename_fragments(recordings: &mut [Recording], config: &Config) {
    let heading = if config.dryrun {
        "Dry run: rename fragments"
    } else {
        "Renaming fragments"
    };
    print_bold!("{heading}");

    let mut renamed = 0usize;
    for recording in recordings.iter_mut() {
        recording.fragments.sort_by_key(|fragment| fragment.index);
        for fragment in &mut recording.fragments {
            let old_path = fragment.input_path(&config.input_dir);
            let new_path = fragment.new_path(&config.input_dir);
            if old_path == new_path {
                println!("Already renamed: {}", fragment.current_name);
                continue;
            }
            gopro_tools::show_diff(&fragment.current_name, &fragment.new_name);
            if !config.dryrun {
                if let Err(error) = fs::rename(&old_path, &new_path) {
                    gopro_tools::print_error!(
                        "Failed to rename {}: {error}",
                        gopro_tools::path_to_string_relative(&old_path)
                    );
                    continue;
                }
                fragment.current_name.clone_from(&fragment.new_name);
                renamed += 1;
            }
        }
    }

    if !config.dryrun {
        print_green!("Renamed {renamed} file(s)");
    }
}

/// Merge the fragments of every recording into one output file each.
///
/// Fragments are concatenated in index order.
/// A failed merge is reported and does not stop the remaining recordings.
async fn merge_recordings(recordings: &[Recording], config: &Config) -> Result<()> {
    fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;

    for recording in recordings {
        let Some(output_path) = recording.output_path(&config.output_dir) else {
            continue;
        };

        let missing = recording.missing_fragments();
        if missing > 0 {
            print_warning!(
                "Recording {}: expected {} fragments, found {}",
                recording.id,
                recording.expected,
                recording.fragments.len()
            );
        }

        let sources: Vec<PathBuf> = recording
            .fragments_in_order()
            .into_iter()
            .map(|fragment| fragment.input_path(&config.input_dir))
            .collect();

        println!("Merging {} fragment(s) with ID {}...", sources.len(), recording.id.bold());

        match concatenate(&output_path, &sources).await {
            Ok(()) => {
                let size = fs::metadata(&output_path).map(|metadata| metadata.len()).unwrap_or(0);
                print_green!(
                    "Wrote {} ({})",
                    gopro_tools::path_to_string_relative(&output_path),
                    gopro_tools::format_size(size)
                );
            }
            Err(error) => {
                gopro_tools::print_error!("Failed to merge recording {}: {error}", recording.id);
            }
        }
    }

    Ok(())
}

/// Create a Semaphore for I/O-bound work.
#[inline]
fn create_semaphore_for_io_bound() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(num_cpus::get_physical() * 2))
}
