//! Package command: tar backup of a data directory.

use super::{format_size, open_reader, store_config};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tcpmon_core::{CoreError, Store, StoreConfig};
use tracing::{info, warn};

/// Creates a tar archive of every data file.
///
/// Unless `no_seal` is set the active file is sealed first so the archive
/// holds a consistent copy. If a running writer holds the directory the
/// archive is written without sealing.
pub fn package(
    dir: &Path,
    output_path: &Path,
    no_seal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !no_seal {
        match seal_active(store_config(dir)) {
            Ok(_) => {}
            Err(CoreError::Locked { .. }) => {
                warn!("Store is in use by a writer; packaging without sealing");
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Packaging {:?}", dir);
    let reader = open_reader(dir)?;
    let file = File::create(output_path)?;
    let stats = reader.package(BufWriter::new(file))?;

    println!("✓ Package created successfully");
    println!("  Path:  {:?}", output_path);
    println!("  Files: {}", stats.files);
    println!("  Data:  {}", format_size(stats.bytes));
    Ok(())
}

/// Seals the file a stopped writer left active.
///
/// Opening the store seals leftover raw files; the store is closed again
/// without writing, so no empty file is sealed.
pub fn seal(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match seal_active(store_config(dir))? {
        0 => println!("✓ Nothing to seal"),
        sealed => println!("✓ Sealed {} file(s)", sealed),
    }
    Ok(())
}

fn seal_active(config: StoreConfig) -> Result<u64, CoreError> {
    let store = Store::open(config)?;
    let sealed = store.stats().seals;
    store.close()?;
    info!(sealed, "Sealed leftover data files");
    Ok(sealed)
}
