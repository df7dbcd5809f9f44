//! Resolution and ordering of descriptor file dependencies.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, ErrorKind};
use crate::types::FileDescriptorProto;
use crate::wkt;

/// Supplies descriptor files that translation does not produce itself.
pub(crate) trait DescriptorLoader {
    fn load(&self, name: &str) -> Option<FileDescriptorProto>;
}

/// The default loader, serving the embedded `well_known` descriptors.
pub(crate) struct WellKnownLoader;

impl DescriptorLoader for WellKnownLoader {
    fn load(&self, name: &str) -> Option<FileDescriptorProto> {
        wkt::get(name).cloned()
    }
}

/// Completes and orders a descriptor set: any dependency name not present is
/// fetched through the loader (transitively), then the whole set is sorted so
/// every file appears after its dependencies. Ties are broken by file name,
/// so the output is deterministic for a given input.
pub(crate) fn resolve_and_sort(
    files: Vec<FileDescriptorProto>,
    loader: &dyn DescriptorLoader,
) -> Result<Vec<FileDescriptorProto>, Error> {
    let mut by_name = BTreeMap::new();
    for file in files {
        by_name.insert(file.name.clone().unwrap_or_default(), file);
    }

    loop {
        let missing: Vec<String> = by_name
            .values()
            .flat_map(|file| file.dependency.iter())
            .filter(|dep| !by_name.contains_key(*dep))
            .cloned()
            .collect();
        if missing.is_empty() {
            break;
        }
        for name in missing {
            let file = loader.load(&name).ok_or_else(|| {
                Error::from_kind(ErrorKind::UnknownDescriptorDependency { name: name.clone() })
            })?;
            by_name.insert(name, file);
        }
    }

    let mut remaining: Vec<FileDescriptorProto> = by_name.into_values().collect();
    let mut sorted = Vec::with_capacity(remaining.len());
    let mut placed = HashSet::new();

    while !remaining.is_empty() {
        let mut rest = Vec::new();
        let mut progressed = false;
        for file in remaining {
            if file.dependency.iter().all(|dep| placed.contains(dep)) {
                placed.insert(file.name.clone().unwrap_or_default());
                sorted.push(file);
                progressed = true;
            } else {
                rest.push(file);
            }
        }
        if !progressed {
            let files = rest
                .iter()
                .map(|file| file.name.as_deref().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::from_kind(ErrorKind::DependencyCycle { files }));
        }
        remaining = rest;
    }

    Ok(sorted)
}
