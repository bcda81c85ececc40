//! Classification of repository-relative paths into Maven coordinates.

pub const METADATA_NAME: &str = "maven-metadata.xml";

/// A groupId/artifactId pair plus the directory it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    /// `org/apache/httpcomponents/httpclient`
    pub dir: String,
}

impl Coordinate {
    fn from_segments(segments: &[&str]) -> Option<Self> {
        let (artifact_id, group) = segments.split_last()?;
        if group.is_empty() || artifact_id.is_empty() || group.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Coordinate {
            group_id: group.join("."),
            artifact_id: artifact_id.to_string(),
            dir: segments.join("/"),
        })
    }

    /// Repository-relative path of the coordinate's metadata document.
    pub fn metadata_path(&self) -> String {
        format!("{}/{}", self.dir, METADATA_NAME)
    }

    /// Repository-relative directory of one version, with trailing slash.
    pub fn version_dir(&self, version: &str) -> String {
        format!("{}/{}/", self.dir, version)
    }
}

/// What a published path means for metadata reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MavenPath {
    /// `<group...>/<artifactId>/<version>/<artifactId>-<version>*`
    Artifact {
        coordinate: Coordinate,
        version: String,
    },
    /// `<group...>/<artifactId>/maven-metadata.xml`, merged rather than uploaded.
    Metadata { coordinate: Coordinate },
    /// Checksums or signatures of a metadata fragment. The engine owns the
    /// merged document, so these would go stale and are skipped.
    MetadataSidecar,
    Other,
}

pub fn classify(relative: &str) -> MavenPath {
    let segments: Vec<&str> = relative.trim_matches('/').split('/').collect();
    let Some((file, dirs)) = segments.split_last() else {
        return MavenPath::Other;
    };

    if file.starts_with(METADATA_NAME) {
        let version_level = dirs
            .last()
            .map(|d| d.to_ascii_uppercase().ends_with("-SNAPSHOT"))
            .unwrap_or(false);
        if version_level {
            return MavenPath::Other;
        }
        if *file != METADATA_NAME {
            return MavenPath::MetadataSidecar;
        }
        return match Coordinate::from_segments(dirs) {
            Some(coordinate) => MavenPath::Metadata { coordinate },
            None => MavenPath::Other,
        };
    }

    if dirs.len() < 3 {
        return MavenPath::Other;
    }
    let (version, coordinate_segments) = match dirs.split_last() {
        Some(split) => split,
        None => return MavenPath::Other,
    };
    let Some(coordinate) = Coordinate::from_segments(coordinate_segments) else {
        return MavenPath::Other;
    };
    let stem = format!("{}-{}", coordinate.artifact_id, version);
    if !file.starts_with(&stem) {
        return MavenPath::Other;
    }
    MavenPath::Artifact {
        coordinate,
        version: version.to_string(),
    }
}

/// The coordinate whose version directory would hold `relative`, for any
/// file at least three directories deep, whatever its name.
pub fn enclosing_coordinate(relative: &str) -> Option<Coordinate> {
    let segments: Vec<&str> = relative.trim_matches('/').split('/').collect();
    let (_, dirs) = segments.split_last()?;
    if dirs.len() < 3 {
        return None;
    }
    Coordinate::from_segments(&dirs[..dirs.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_yield_coordinate_and_version() {
        let path = "org/apache/httpcomponents/httpclient/4.5.6/httpclient-4.5.6.jar.sha1";
        match classify(path) {
            MavenPath::Artifact {
                coordinate,
                version,
            } => {
                assert_eq!(coordinate.group_id, "org.apache.httpcomponents");
                assert_eq!(coordinate.artifact_id, "httpclient");
                assert_eq!(coordinate.dir, "org/apache/httpcomponents/httpclient");
                assert_eq!(version, "4.5.6");
                assert_eq!(
                    coordinate.metadata_path(),
                    "org/apache/httpcomponents/httpclient/maven-metadata.xml"
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_segment_group_is_an_artifact() {
        let path = "commons-logging/commons-logging/1.2/commons-logging-1.2-sources.jar";
        assert!(matches!(classify(path), MavenPath::Artifact { .. }));
    }

    #[test]
    fn unrelated_files_are_other() {
        assert_eq!(classify("org/foo/bar/1.0/foo-bar-1.0.txt"), MavenPath::Other);
        assert_eq!(classify("README.md"), MavenPath::Other);
        assert_eq!(classify("org/bar/1.0/bar-1.0.jar"), MavenPath::Artifact {
            coordinate: Coordinate {
                group_id: "org".into(),
                artifact_id: "bar".into(),
                dir: "org/bar".into(),
            },
            version: "1.0".into(),
        });
        assert_eq!(classify("bar/1.0/bar-1.0.jar"), MavenPath::Other);
    }

    #[test]
    fn metadata_fragments_and_sidecars() {
        assert!(matches!(
            classify("org/foo/bar/maven-metadata.xml"),
            MavenPath::Metadata { .. }
        ));
        assert_eq!(
            classify("org/foo/bar/maven-metadata.xml.sha1"),
            MavenPath::MetadataSidecar
        );
        assert_eq!(
            classify("org/foo/bar/1.0-SNAPSHOT/maven-metadata.xml"),
            MavenPath::Other
        );
        assert_eq!(classify("maven-metadata.xml"), MavenPath::Other);
    }

    #[test]
    fn any_file_in_a_version_directory_has_an_enclosing_coordinate() {
        let coordinate = enclosing_coordinate("org/apache/httpcomponents/httpclient/4.5.9/zz-notes.txt")
            .expect("coordinate");
        assert_eq!(coordinate.dir, "org/apache/httpcomponents/httpclient");
        assert_eq!(coordinate.artifact_id, "httpclient");
        assert!(enclosing_coordinate("org/foo/readme.txt").is_none());
        assert!(enclosing_coordinate("readme.txt").is_none());
    }
}
