//! Read-side projection of the catalog.
//!
//! Turns a snapshot of stored projects into the listing served to API
//! consumers: projects sorted by name, each with its latest release picked
//! out and every binary given a public download URL.
//!
//! Download URLs are built here and nowhere else, as
//! `{domain}/releases/{project id}/{version}/{file name}`. Where artifacts are
//! actually stored is a separate concern of the builder and the download
//! handler.

use std::collections::BTreeMap;

use crate::types::{BinaryUI, Project, ProjectId, ProjectUI, Release, ReleaseUI};

/// Projects a catalog snapshot into the public listing.
///
/// Output order is by stored project name, case-sensitive ascending; the
/// sort is stable, so projects sharing a name keep their input order.
pub fn project_views(projects: &[Project], domain: &str) -> Vec<ProjectUI> {
    let mut sorted: Vec<&Project> = projects.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    sorted
        .into_iter()
        .map(|project| project_view(project, domain))
        .collect()
}

/// Projects a single stored project.
pub fn project_view(project: &Project, domain: &str) -> ProjectUI {
    let latest = latest_release(project)
        .map(|release| release.version.clone())
        .unwrap_or_default();

    let releases: BTreeMap<String, ReleaseUI> = project
        .releases
        .iter()
        .map(|(version, release)| {
            let binaries = release
                .binaries
                .iter()
                .map(|binary| BinaryUI {
                    url: binary_url(domain, &project.id, version, &binary.file_name),
                    checksum: binary.checksum.clone(),
                })
                .collect();
            (version.clone(), ReleaseUI { binaries })
        })
        .collect();

    ProjectUI {
        name: title_case(&project.name),
        latest_release: latest.clone(),
        current_release: latest,
        releases,
    }
}

/// Picks the most recently created release.
///
/// When two releases share a creation time, the one with the
/// lexicographically greatest version string wins, so the result never
/// depends on map iteration order.
pub fn latest_release(project: &Project) -> Option<&Release> {
    project
        .releases
        .values()
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.version.cmp(&b.version))
        })
}

/// Builds the public download URL for a binary.
///
/// # Examples
///
/// ```
/// use rabbit::aggregate::binary_url;
/// use rabbit::types::ProjectId;
///
/// assert_eq!(
///     binary_url("https://example.com/", &ProjectId::new("U"), "v1.1", "app.tar.gz"),
///     "https://example.com/releases/U/v1.1/app.tar.gz"
/// );
/// ```
pub fn binary_url(domain: &str, project: &ProjectId, version: &str, file_name: &str) -> String {
    format!(
        "{}/releases/{}/{}/{}",
        domain.trim_end_matches('/'),
        project,
        version,
        file_name
    )
}

/// Upper-cases the first letter of every word.
///
/// Word boundaries follow Go's `strings.Title`: in ASCII anything other than
/// a letter, digit or underscore separates words, while outside ASCII only
/// whitespace does. Letters are mapped with upper case rather than title
/// case, which only differs for the few digraph letters such as `ǆ`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;

    for c in name.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = is_word_separator(c);
    }

    out
}

fn is_word_separator(c: char) -> bool {
    if c.is_ascii() {
        return !(c.is_ascii_alphanumeric() || c == '_');
    }
    if c.is_alphabetic() || c.is_numeric() {
        return false;
    }
    c.is_whitespace()
}
