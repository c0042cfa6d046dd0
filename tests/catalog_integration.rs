use std::fs;
use std::path::{Path, PathBuf};

use catzip::{Catalog, CatalogConfig, CatalogError, NodeKind, ZipExtractor};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Drawings {
    _temp: TempDir,
    root: PathBuf,
    staging: PathBuf,
    catalog: Catalog,
}

/// `2020-Ford/F150` with a manual and a wiring diagram, plus a second
/// year-make so the structure listing has something to sort.
fn drawings() -> Drawings {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("DiscoveryDrawings");
    let staging = temp.path().join("staging");

    let f150 = root.join("2020-Ford/F150");
    fs::create_dir_all(f150.join("wiring")).unwrap();
    fs::create_dir_all(f150.join("scans")).unwrap();
    fs::create_dir_all(root.join("2020-Ford/Mustang")).unwrap();
    fs::create_dir_all(root.join("2018-Jeep/Wrangler")).unwrap();
    fs::create_dir_all(&staging).unwrap();
    fs::write(f150.join("manual.pdf"), b"0123456789").unwrap();
    fs::write(f150.join("wiring/diagram.pdf"), b"abcdefghijklmnopqrst").unwrap();

    let config = CatalogConfig::new(&root).with_temp_dir(&staging);
    let catalog = Catalog::new(&config).unwrap();
    Drawings {
        _temp: temp,
        root,
        staging,
        catalog,
    }
}

fn archive_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut extractor = ZipExtractor::open(path).unwrap();
    let entries = extractor.list_files().unwrap();
    entries
        .iter()
        .map(|e| (e.file_name.clone(), extractor.extract_to_memory(e).unwrap()))
        .collect()
}

#[tokio::test]
async fn test_structure_lists_year_makes_and_models() {
    let d = drawings();
    let structure = d.catalog.file_structure().await.unwrap();

    assert_eq!(structure.total_year_makes, 2);
    assert_eq!(structure.total_models, 3);
    assert_eq!(structure.structure[0].year_make, "2018-Jeep");
    assert_eq!(structure.structure[1].models, ["F150", "Mustang"]);
    assert!(structure.structure.iter().all(|g| g.error.is_none()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_year_make_gets_error_marker() {
    use std::os::unix::fs::PermissionsExt;

    let d = drawings();
    let locked = d.root.join("2021-Locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read it anyway; nothing to observe then.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let structure = d.catalog.file_structure().await.unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let group = structure
        .structure
        .iter()
        .find(|g| g.year_make == "2021-Locked")
        .unwrap();
    assert_eq!(group.error.as_deref(), Some(catzip::catalog::YEAR_MAKE_READ_ERROR));
    assert_eq!(group.model_count, 0);
    assert_eq!(structure.total_year_makes, 3);
}

#[tokio::test]
async fn test_files_for_a_model() {
    let d = drawings();
    let nodes = d
        .catalog
        .files("2020-Ford", "F150", &CancellationToken::new())
        .await
        .unwrap();

    let summary: Vec<_> = nodes
        .iter()
        .map(|n| (n.name.as_str(), n.kind, n.size, n.file_count, n.is_downloadable))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("scans", NodeKind::Directory, 0, 0, false),
            ("wiring", NodeKind::Directory, 20, 1, true),
            ("diagram.pdf", NodeKind::File, 20, 1, true),
            ("manual.pdf", NodeKind::File, 10, 1, true),
        ]
    );

    let json = serde_json::to_value(&nodes).unwrap();
    assert_eq!(json[2]["parentDirectory"], "wiring");
    assert_eq!(json[2]["fullPath"], "wiring/diagram.pdf");
    assert_eq!(json[3]["extension"], ".pdf");
    assert!(nodes[1].is_directory() && !nodes[2].is_directory());
}

#[tokio::test]
async fn test_traversal_is_rejected_everywhere() {
    let d = drawings();
    let cancel = CancellationToken::new();

    assert!(d.catalog.models("..").await.unwrap_err().is_traversal());
    assert!(
        d.catalog
            .files("2020-Ford", "../2018-Jeep", &cancel)
            .await
            .unwrap_err()
            .is_traversal()
    );
    assert!(
        d.catalog
            .resolve_file("2020-Ford", "F150", "/etc/passwd", None)
            .await
            .unwrap_err()
            .is_traversal()
    );
    assert!(
        d.catalog
            .zip_model_directory("2020-Ford", "F150", "../../..", &cancel)
            .await
            .unwrap_err()
            .is_traversal()
    );
    assert!(
        d.catalog
            .create_zip_from_files("2020-Ford", "F150", vec!["../Mustang__x".into()], &cancel)
            .await
            .unwrap_err()
            .is_traversal()
    );
    assert_eq!(fs::read_dir(&d.staging).unwrap().count(), 0);
}

#[tokio::test]
async fn test_model_archive_round_trips() {
    let d = drawings();
    let archive = d
        .catalog
        .zip_model("2020-Ford", "F150", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive.download_name, "2020-Ford_F150_all.zip");
    assert_eq!(archive.entries, 2);
    assert_eq!(archive.bytes, 30);
    assert_eq!(
        archive_entries(&archive.path),
        vec![
            ("manual.pdf".to_string(), b"0123456789".to_vec()),
            ("wiring/diagram.pdf".to_string(), b"abcdefghijklmnopqrst".to_vec()),
        ]
    );

    // The catalog itself is never written to.
    assert!(!d.root.join("2020-Ford/F150.zip").exists());

    let path = archive.path.clone();
    archive.discard().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_selection_with_one_missing_key() {
    let d = drawings();
    let archive = d
        .catalog
        .create_zip_from_files(
            "2020-Ford",
            "F150",
            vec!["wiring__diagram.pdf".into(), "wiring__gone.pdf".into()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(archive.download_name, "2020-Ford_F150_selected.zip");
    assert_eq!(
        archive_entries(&archive.path),
        vec![(
            "wiring__diagram.pdf".to_string(),
            b"abcdefghijklmnopqrst".to_vec()
        )]
    );
    archive.discard().await.unwrap();
}

#[tokio::test]
async fn test_missing_model_is_not_found() {
    let d = drawings();
    let err = d
        .catalog
        .zip_model("2020-Ford", "Bronco", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));
}

#[tokio::test]
async fn test_concurrent_archives_do_not_collide() {
    let d = drawings();
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        d.catalog.zip_model("2020-Ford", "F150", &cancel),
        d.catalog.zip_model("2020-Ford", "F150", &cancel),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.path, b.path);
    assert_eq!(archive_entries(&a.path), archive_entries(&b.path));
    a.discard().await.unwrap();
    b.discard().await.unwrap();
}
