use std::fs;
use std::path::Path;

use image::{ImageFormat, RgbImage};
use tempfile::tempdir;

use vocprep::config::{CategoryGroup, PipelineConfig};
use vocprep::normalize::{apply_plan, plan, NormalizeOp, NormalizeOptions};
use vocprep::{audit, integrity, partition, pipeline, voc};

fn write_image(path: &Path, format: ImageFormat) {
    let img = RgbImage::from_pixel(8, 8, image::Rgb([120, 80, 40]));
    image::DynamicImage::ImageRgb8(img)
        .save_with_format(path, format)
        .unwrap();
}

fn write_annotation(path: &Path, filename: &str, width: u32) {
    let content = format!(
        "<annotation>\
         <filename>{}</filename>\
         <path>/somewhere/{}</path>\
         <size><width>{}</width><height>480</height><depth>3</depth></size>\
         </annotation>",
        filename, filename, width
    );
    fs::write(path, content).unwrap();
}

// A labelImg-style document with one <object> per label given.
fn write_labeled_annotation(path: &Path, filename: &str, labels: &[&str]) {
    let objects: String = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            format!(
                "<object>\
                 <name>{}</name><pose>Unspecified</pose>\
                 <truncated>0</truncated><difficult>0</difficult>\
                 <bndbox><xmin>{}</xmin><ymin>10</ymin><xmax>{}</xmax><ymax>200</ymax></bndbox>\
                 </object>",
                label,
                10 + i * 100,
                90 + i * 100
            )
        })
        .collect();
    let content = format!(
        "<annotation>\
         <folder>Metal</folder>\
         <filename>{}</filename>\
         <path>/somewhere/{}</path>\
         <source><database>Unknown</database></source>\
         <size><width>640</width><height>480</height><depth>3</depth></size>\
         <segmented>0</segmented>{}\
         </annotation>",
        filename, filename, objects
    );
    fs::write(path, content).unwrap();
}

#[test]
fn integrity_check_flags_mislabeled_and_corrupt_files() {
    let dir = tempdir().unwrap();

    // A real JPEG, a PNG masquerading as a JPEG, and plain garbage.
    write_image(&dir.path().join("good.jpg"), ImageFormat::Jpeg);
    write_image(&dir.path().join("fake.jpg"), ImageFormat::Png);
    fs::write(dir.path().join("broken.jpg"), b"not an image at all").unwrap();
    // Files with other extensions are ignored entirely.
    write_image(&dir.path().join("ignored.png"), ImageFormat::Png);

    let report = integrity::check_tree(dir.path(), "jpg", ImageFormat::Jpeg);
    assert_eq!(report.checked, 3);
    assert_eq!(report.issues.len(), 2);

    let flagged: Vec<_> = report
        .issues
        .iter()
        .map(|issue| issue.path.file_name().unwrap().to_str().unwrap())
        .collect();
    assert!(flagged.contains(&"fake.jpg"));
    assert!(flagged.contains(&"broken.jpg"));
    assert!(!flagged.contains(&"good.jpg"));
}

#[test]
fn integrity_check_never_fails_on_empty_tree() {
    let dir = tempdir().unwrap();
    let report = integrity::check_tree(dir.path(), "jpg", ImageFormat::Jpeg);
    assert!(report.is_clean());
    assert_eq!(report.checked, 0);
}

#[test]
fn audit_reports_zero_width_annotations_once() {
    let dir = tempdir().unwrap();

    write_annotation(&dir.path().join("x.xml"), "x.jpg", 0);
    write_annotation(&dir.path().join("ok.xml"), "ok.jpg", 640);
    // No size block: skipped, counted, never listed.
    fs::write(
        dir.path().join("nosize.xml"),
        "<annotation><filename>nosize.jpg</filename></annotation>",
    )
    .unwrap();
    // Malformed document: logged and skipped.
    fs::write(dir.path().join("bad.xml"), "<annotation><filename>").unwrap();

    let report = audit::audit_tree(dir.path());
    assert_eq!(report.scanned, 4);
    assert_eq!(report.degenerate, vec!["x.jpg".to_string()]);
    assert_eq!(report.missing_size, 1);
    assert_eq!(report.parse_failures, 1);

    let output_path = audit::write_error_file(dir.path(), &report).unwrap();
    let written = fs::read_to_string(output_path).unwrap();
    assert_eq!(written, "x.jpg\n");
}

#[test]
fn audit_overwrites_previous_error_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("error_files.txt"), "stale.jpg\n").unwrap();

    let report = audit::audit_tree(dir.path());
    let output_path = audit::write_error_file(dir.path(), &report).unwrap();
    assert_eq!(fs::read_to_string(output_path).unwrap(), "");
}

#[test]
fn normalize_converts_png_and_rewrites_annotation() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("b.png"), ImageFormat::Png);
    write_annotation(&dir.path().join("b.xml"), "b.png", 640);

    let ops = plan(dir.path()).unwrap();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], NormalizeOp::Convert { .. }));

    let report = apply_plan(&ops, NormalizeOptions::default()).unwrap();
    assert_eq!(report.converted, 1);

    let converted = dir.path().join("b.jpg");
    assert!(converted.exists());
    // Default policy keeps the source.
    assert!(dir.path().join("b.png").exists());
    assert!(
        integrity::check_file(&converted, ImageFormat::Jpeg).is_none(),
        "converted file must be a decodable JPEG"
    );

    let annotation = voc::read_annotation(&dir.path().join("b.xml")).unwrap();
    assert_eq!(annotation.filename, "b.jpg");
    let path = annotation.path.unwrap();
    assert!(Path::new(&path).is_absolute());
    assert!(path.ends_with("b.jpg"));
}

#[test]
fn normalize_rewrites_annotations_that_contain_objects() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("b.png"), ImageFormat::Png);
    write_labeled_annotation(&dir.path().join("b.xml"), "b.png", &["Metal", "Plastic"]);
    write_image(&dir.path().join("d.jpeg"), ImageFormat::Jpeg);
    write_labeled_annotation(&dir.path().join("d.xml"), "d.jpeg", &["Metal"]);

    let ops = plan(dir.path()).unwrap();
    assert_eq!(ops.len(), 2);
    let report = apply_plan(&ops, NormalizeOptions::default()).unwrap();
    assert_eq!(report.converted, 1);
    assert_eq!(report.renamed, 1);

    // The rewrite must retarget the references and keep every object.
    let converted = voc::read_annotation(&dir.path().join("b.xml")).unwrap();
    assert_eq!(converted.filename, "b.jpg");
    assert_eq!(converted.objects.len(), 2);
    assert_eq!(converted.objects[0].name, "Metal");
    assert_eq!(converted.objects[1].name, "Plastic");
    assert_eq!(converted.objects[1].bndbox.xmin, 110);
    assert_eq!(converted.size.unwrap().width, 640);

    let renamed = voc::read_annotation(&dir.path().join("d.xml")).unwrap();
    assert_eq!(renamed.filename, "d.jpg");
    assert_eq!(renamed.objects.len(), 1);
}

#[test]
fn normalize_can_remove_converted_sources() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("b.png"), ImageFormat::Png);
    write_annotation(&dir.path().join("b.xml"), "b.png", 640);

    let ops = plan(dir.path()).unwrap();
    apply_plan(
        &ops,
        NormalizeOptions {
            remove_sources: true,
        },
    )
    .unwrap();

    assert!(dir.path().join("b.jpg").exists());
    assert!(!dir.path().join("b.png").exists());
}

#[test]
fn normalize_renames_jpeg_and_roundtrips_references() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("d.jpeg"), ImageFormat::Jpeg);
    write_annotation(&dir.path().join("d.xml"), "d.jpeg", 640);

    let ops = plan(dir.path()).unwrap();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], NormalizeOp::Rename { .. }));
    apply_plan(&ops, NormalizeOptions::default()).unwrap();

    let renamed = dir.path().join("d.jpg");
    assert!(renamed.exists());
    assert!(!dir.path().join("d.jpeg").exists());

    // The annotation text must match the renamed file exactly.
    let annotation = voc::read_annotation(&dir.path().join("d.xml")).unwrap();
    assert_eq!(annotation.filename, "d.jpg");
    let expected = fs::canonicalize(dir.path()).unwrap().join("d.jpg");
    assert_eq!(annotation.path.unwrap(), expected.to_string_lossy());
}

#[test]
fn normalized_tree_is_a_fixed_point() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("a.jpg"), ImageFormat::Jpeg);
    write_annotation(&dir.path().join("a.xml"), "a.jpg", 640);
    write_image(&dir.path().join("b.png"), ImageFormat::Png);
    write_annotation(&dir.path().join("b.xml"), "b.png", 640);
    write_image(&dir.path().join("d.jpeg"), ImageFormat::Jpeg);
    write_annotation(&dir.path().join("d.xml"), "d.jpeg", 640);

    let ops = plan(dir.path()).unwrap();
    assert_eq!(ops.len(), 2);
    apply_plan(&ops, NormalizeOptions::default()).unwrap();

    // Second run plans nothing, even with the PNG source still in place.
    let ops = plan(dir.path()).unwrap();
    assert!(ops.is_empty(), "expected empty plan, got {:?}", ops);
}

#[test]
fn collect_pairs_skips_images_without_annotations() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("a.jpg"), ImageFormat::Jpeg);
    write_annotation(&dir.path().join("a.xml"), "a.jpg", 640);
    write_image(&dir.path().join("c.jpg"), ImageFormat::Jpeg);

    let pairs = partition::collect_pairs(dir.path()).unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].image, "a.jpg");
    assert_eq!(pairs[0].annotation, "a.xml");
}

#[test]
fn copy_split_surfaces_missing_source_as_error() {
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("a.jpg"), ImageFormat::Jpeg);
    write_annotation(&dir.path().join("a.xml"), "a.jpg", 640);

    let pairs = partition::collect_pairs(dir.path()).unwrap();
    assert_eq!(pairs.len(), 1);

    // The file vanishes between collection and copy; this must be an error
    // naming the path, never a silent skip.
    fs::remove_file(dir.path().join("a.xml")).unwrap();

    let split = partition::split_pairs(pairs, 0.0, 42);
    let err = partition::copy_split(
        &split,
        dir.path(),
        &dir.path().join("train"),
        &dir.path().join("val"),
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("a.xml"), "error was: {}", err);
}

#[test]
fn prepare_scenario_normalizes_splits_and_writes_manifest() {
    let dir = tempdir().unwrap();
    let subcat_dir = dir.path().join("datasets/Recyclable/Metal");
    fs::create_dir_all(&subcat_dir).unwrap();

    write_image(&subcat_dir.join("a.jpg"), ImageFormat::Jpeg);
    write_annotation(&subcat_dir.join("a.xml"), "a.jpg", 640);
    write_image(&subcat_dir.join("b.png"), ImageFormat::Png);
    write_annotation(&subcat_dir.join("b.xml"), "b.png", 640);
    // No c.xml: c is skipped and logged.
    write_image(&subcat_dir.join("c.jpg"), ImageFormat::Jpeg);

    let config = PipelineConfig {
        dataset_root: dir.path().join("datasets"),
        train_dir: dir.path().join("organized_data/train"),
        val_dir: dir.path().join("organized_data/val"),
        manifest_path: dir.path().join("datasets.csv"),
        groups: vec![CategoryGroup {
            category: "Recyclable".to_string(),
            subcategories: vec!["Metal".to_string()],
        }],
        ..PipelineConfig::default()
    };

    let summary = pipeline::prepare(&config).unwrap();
    assert_eq!(summary.normalize.converted, 1);
    assert_eq!(summary.train_pairs + summary.val_pairs, 2);
    // ceil(2 * 0.2) = 1
    assert_eq!(summary.val_pairs, 1);

    let manifest = fs::read_to_string(&config.manifest_path).unwrap();
    let lines: Vec<_> = manifest.lines().collect();
    assert_eq!(
        lines[0],
        "File Type,Category,Subcategory,Image,Annotation"
    );
    assert_eq!(lines.len(), 3, "header plus one row per retained pair");
    assert!(lines[1..].iter().all(|line| line.contains("Recyclable")));
    assert!(!manifest.contains("c.jpg"));

    // Each destination holds both files of every pair assigned to it.
    let count_files = |dir: &Path| fs::read_dir(dir).unwrap().count();
    assert_eq!(count_files(&config.train_dir), 2 * summary.train_pairs);
    assert_eq!(count_files(&config.val_dir), 2 * summary.val_pairs);
}

#[test]
fn prepare_is_reproducible_across_runs() {
    let dir = tempdir().unwrap();
    let subcat_dir = dir.path().join("datasets/Recyclable/Metal");
    fs::create_dir_all(&subcat_dir).unwrap();
    for i in 0..6 {
        let stem = format!("img{}", i);
        write_image(&subcat_dir.join(format!("{}.jpg", stem)), ImageFormat::Jpeg);
        write_annotation(
            &subcat_dir.join(format!("{}.xml", stem)),
            &format!("{}.jpg", stem),
            640,
        );
    }

    let pairs = partition::collect_pairs(&subcat_dir).unwrap();
    let first = partition::split_pairs(pairs.clone(), 0.2, 42);
    let second = partition::split_pairs(pairs, 0.2, 42);
    assert_eq!(first.train, second.train);
    assert_eq!(first.val, second.val);
}
