use std::cell::Cell;

use nalgebra::{Point3, Rotation3, Vector3};
use sfm_core::{CameraPose, Descriptor, Image, Intrinsics, Keypoint};
use sfm_features::{DescriptorKind, FeatureBackend, FeatureError, FeatureResult, FeatureSet, HISTOGRAM_DIM};
use sfm_pipeline::{PlyFormat, Reconstruction, SfmConfig, SfmError, Stage};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

/// Returns pre-computed feature sets in call order. Descriptors are one-hot
/// histograms keyed by scene point, so identical points match exactly.
struct ScriptedBackend {
    frames: Vec<Option<FeatureSet>>,
    next: Cell<usize>,
}

impl ScriptedBackend {
    fn boxed(frames: Vec<Option<FeatureSet>>) -> Box<dyn FeatureBackend> {
        Box::new(Self { frames, next: Cell::new(0) })
    }
}

impl FeatureBackend for ScriptedBackend {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::GradientHistogram
    }

    fn detect_and_describe(&self, _image: &Image) -> FeatureResult<FeatureSet> {
        let i = self.next.get();
        self.next.set(i + 1);
        self.frames.get(i).cloned().flatten().ok_or(FeatureError::NoKeypoints)
    }

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        a.euclidean(b).unwrap_or(f32::INFINITY)
    }
}

fn one_hot(id: usize) -> Descriptor {
    let mut v = vec![0.0; HISTOGRAM_DIM];
    v[id] = 1.0;
    Descriptor::Histogram(v)
}

fn intrinsics() -> Intrinsics {
    Intrinsics::new(800.0, 800.0, 320.0, 240.0).unwrap()
}

/// Twelve points on a slightly tilted plane five units ahead of the origin
fn planar_scene() -> Vec<Point3<f64>> {
    let xy = [
        (-1.4, -0.9),
        (-0.6, -1.0),
        (0.3, -0.8),
        (1.3, -0.95),
        (-1.2, 0.1),
        (-0.3, -0.15),
        (0.55, 0.2),
        (1.45, 0.05),
        (-1.5, 0.95),
        (-0.45, 0.8),
        (0.7, 1.0),
        (1.1, 0.7),
    ];
    xy.iter().map(|&(x, y)| Point3::new(x, y, 5.0 + 0.1 * x - 0.05 * y)).collect()
}

/// Thirty points spread through a slab of depth around five units
fn volume_scene() -> Vec<Point3<f64>> {
    (0..30)
        .map(|i| {
            let f = i as f64;
            Point3::new((f * 0.37).sin() * 1.5, (f * 0.61).cos(), 5.0 + (f * 0.23).sin() * 1.5)
        })
        .collect()
}

fn rotation_angle(a: &CameraPose, b: &CameraPose) -> f64 {
    (((a.rotation.transpose() * b.rotation).trace() - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

fn second_camera() -> CameraPose {
    CameraPose::new(
        Rotation3::from_euler_angles(0.0, 0.05, 0.0).into_inner(),
        Vector3::new(-0.5, 0.02, 0.05),
    )
}

/// Observation of `ids` (indices into `scene`) from `pose`
fn observe(pose: &CameraPose, scene: &[Point3<f64>], ids: &[usize]) -> FeatureSet {
    let k = intrinsics();
    let mut set = FeatureSet::default();
    for &id in ids {
        let px = pose.project(&k, &scene[id]).unwrap();
        set.keypoints.push(Keypoint::new(px.x as f32, px.y as f32));
        set.descriptors.push(one_hot(id));
    }
    set
}

fn solid_image(color: [u8; 3]) -> Image {
    Image::from_rgb(WIDTH, HEIGHT, color.repeat(WIDTH * HEIGHT)).unwrap()
}

fn config() -> SfmConfig {
    let mut cfg = SfmConfig::default();
    cfg.ransac.seed = Some(11);
    cfg
}

fn run_to_triangulation(sfm: &mut Reconstruction) {
    sfm.detect_features().unwrap();
    sfm.match_features().unwrap();
    sfm.estimate_poses().unwrap();
    sfm.triangulate().unwrap();
}

fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.dot(b) / (a.norm() * b.norm())).clamp(-1.0, 1.0).acos()
}

#[test]
fn planar_pair_recovers_pose_and_points() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let truth = second_camera();
    let frames = vec![
        Some(observe(&CameraPose::identity(), &scene, &ids)),
        Some(observe(&truth, &scene, &ids)),
    ];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images(vec![solid_image([10, 200, 30]), solid_image([90, 90, 90])]).unwrap();

    let detected = sfm.detect_features().unwrap();
    assert_eq!(detected.keypoints, [12, 12]);
    assert!(detected.skipped.is_empty());

    let matched = sfm.match_features().unwrap();
    assert_eq!(matched.matches, [12]);
    let m = sfm.matches(0).unwrap();
    assert!(m.iter().all(|m| m.query_idx == m.train_idx));

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 2);
    assert!(poses.failures.is_empty());
    assert_eq!(poses.inliers, [(0, 12)]);

    let pose = sfm.pose(1).copied().unwrap();
    assert!(angle_between(&pose.translation, &truth.translation) < 1e-2);
    let rot_err = ((pose.rotation.transpose() * truth.rotation).trace() - 1.0) / 2.0;
    assert!(rot_err.clamp(-1.0, 1.0).acos() < 1e-2);

    let tri = sfm.triangulate().unwrap();
    assert_eq!(tri.total_points(), 12);
    assert!(tri.empty_pairs.is_empty());

    // Unit baseline: rescale by the true baseline length before comparing
    let scale = truth.translation.norm();
    for (p, expected) in sfm.cloud().iter().zip(&scene) {
        let recovered = p.position.coords * scale;
        assert!((recovered - expected.coords).norm() < 0.05, "{:?} vs {:?}", recovered, expected);
        assert!(p.position.z > 0.0);
    }
    assert!(sfm.colors().iter().all(|&c| c == [10, 200, 30]));
}

#[test]
fn image_without_features_breaks_only_its_edges() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let frames = vec![
        Some(observe(&CameraPose::identity(), &scene, &ids)),
        Some(observe(&second_camera(), &scene, &ids)),
        None,
        Some(observe(&second_camera(), &scene, &ids)),
    ];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images((0..4).map(|_| solid_image([50, 60, 70])).collect()).unwrap();

    let detected = sfm.detect_features().unwrap();
    assert_eq!(detected.skipped, [2]);
    assert_eq!(detected.keypoints, [12, 12, 0, 12]);
    assert!(sfm.keypoints(2).is_none());

    let matched = sfm.match_features().unwrap();
    assert_eq!(matched.skipped, [1, 2]);
    assert_eq!(matched.matches, [12, 0, 0]);
    assert!(sfm.matches(1).is_none());

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 2);
    assert_eq!(poses.skipped, [1, 2]);
    assert!(sfm.pose(2).is_none());
    assert!(sfm.pose(3).is_none());
    assert!(sfm.camera_poses().len() <= 4);

    let tri = sfm.triangulate().unwrap();
    assert_eq!(tri.total_points(), 12);
    assert_eq!(tri.points, [(0, 12)]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.ply");
    assert_eq!(sfm.export(&path).unwrap(), 12);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("element vertex 12\n"));
    assert_eq!(text.split("end_header\n").nth(1).unwrap().lines().count(), 12);
}

#[test]
fn under_matched_pair_is_never_posed() {
    let scene = planar_scene();
    let all: Vec<usize> = (0..scene.len()).collect();
    let frames = vec![
        Some(observe(&CameraPose::identity(), &scene, &all)),
        Some(observe(&second_camera(), &scene, &[0, 3, 5, 8, 10])),
    ];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images(vec![solid_image([0, 0, 0]), solid_image([0, 0, 0])]).unwrap();
    sfm.detect_features().unwrap();

    let matched = sfm.match_features().unwrap();
    assert_eq!(matched.insufficient.len(), 1);
    assert_eq!(matched.insufficient[0].pair, 0);
    assert_eq!(matched.insufficient[0].found, 5);

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 1);
    assert!(poses.failures.is_empty());
    assert_eq!(poses.skipped, [0]);
    assert!(sfm.state().edge(0).is_none());

    assert_eq!(sfm.triangulate().unwrap().total_points(), 0);
    assert!(sfm.cloud().is_empty());
}

#[test]
fn single_image_exports_empty_cloud() {
    let scene = planar_scene();
    let frames = vec![Some(observe(&CameraPose::identity(), &scene, &[0, 1, 2]))];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images(vec![solid_image([1, 2, 3])]).unwrap();
    sfm.detect_features().unwrap();
    assert!(sfm.match_features().unwrap().matches.is_empty());

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 1);
    assert_eq!(sfm.camera_poses(), [CameraPose::identity()]);

    let tri = sfm.triangulate().unwrap();
    assert_eq!(tri.total_points(), 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.ply");
    assert_eq!(sfm.export(&path).unwrap(), 0);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("ply\n"));
    assert!(text.contains("element vertex 0\n"));
    assert!(text.ends_with("end_header\n"));
}

#[test]
fn repeated_export_is_byte_identical() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();

    for format in [PlyFormat::Ascii, PlyFormat::BinaryLittleEndian] {
        let frames = vec![
            Some(observe(&CameraPose::identity(), &scene, &ids)),
            Some(observe(&second_camera(), &scene, &ids)),
        ];
        let mut cfg = config();
        cfg.export.format = format;
        let mut sfm = Reconstruction::with_backend(cfg, ScriptedBackend::boxed(frames)).unwrap();
        sfm.add_images(vec![solid_image([5, 5, 5]), solid_image([5, 5, 5])]).unwrap();
        run_to_triangulation(&mut sfm);

        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.ply"), dir.path().join("b.ply"));
        sfm.export(&a).unwrap();
        sfm.export(&b).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }
}

#[test]
fn same_seed_same_reconstruction() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let build = || {
        let frames = vec![
            Some(observe(&CameraPose::identity(), &scene, &ids)),
            Some(observe(&second_camera(), &scene, &ids)),
        ];
        let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
        sfm.add_images(vec![solid_image([5, 5, 5]), solid_image([5, 5, 5])]).unwrap();
        run_to_triangulation(&mut sfm);
        sfm
    };
    let (a, b) = (build(), build());
    assert_eq!(a.camera_poses(), b.camera_poses());
    assert_eq!(a.cloud(), b.cloud());
}

#[test]
fn stages_run_once_and_in_order() {
    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(vec![None, None])).unwrap();
    assert!(matches!(sfm.detect_features(), Err(SfmError::StageOrder { expected: Stage::Loaded, actual: Stage::Empty })));
    assert!(matches!(sfm.add_images(Vec::new()), Err(SfmError::NoImages)));
    assert!(matches!(sfm.load_images::<&str>(&[]), Err(SfmError::NoImages)));

    sfm.add_images(vec![solid_image([0, 0, 0]), solid_image([0, 0, 0])]).unwrap();
    assert!(matches!(sfm.add_images(vec![solid_image([0, 0, 0])]), Err(SfmError::StageOrder { .. })));
    assert!(matches!(
        sfm.match_features(),
        Err(SfmError::StageOrder { expected: Stage::Detected, actual: Stage::Loaded })
    ));

    let detected = sfm.detect_features().unwrap();
    assert_eq!(detected.skipped, [0, 1]);
    assert!(matches!(sfm.detect_features(), Err(SfmError::StageOrder { .. })));
    assert_eq!(sfm.state().num_images(), 2);

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(sfm.export(dir.path().join("early.ply")), Err(SfmError::StageOrder { .. })));
    assert!(matches!(sfm.triangulate(), Err(SfmError::StageOrder { .. })));

    run_rest(&mut sfm);
    assert_eq!(sfm.stage(), Stage::Triangulated);
    assert!(matches!(sfm.estimate_poses(), Err(SfmError::StageOrder { .. })));
}

fn run_rest(sfm: &mut Reconstruction) {
    sfm.match_features().unwrap();
    sfm.estimate_poses().unwrap();
    sfm.triangulate().unwrap();
}

#[test]
fn failed_pose_breaks_the_chain() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let third = second_camera().then(&second_camera());

    // Descriptors still match one-to-one, keypoint positions do not
    let mut scrambled = observe(&third, &scene, &ids);
    let positions = scrambled.keypoints.clone();
    for (i, kp) in scrambled.keypoints.iter_mut().enumerate() {
        *kp = positions[(5 * i + 3) % positions.len()];
    }
    let frames = vec![
        Some(observe(&CameraPose::identity(), &scene, &ids)),
        Some(observe(&second_camera(), &scene, &ids)),
        Some(scrambled),
    ];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images((0..3).map(|_| solid_image([20, 20, 20])).collect()).unwrap();
    sfm.detect_features().unwrap();
    assert_eq!(sfm.match_features().unwrap().matches, [12, 12]);

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 2);
    assert_eq!(poses.failures.len(), 1);
    assert_eq!(poses.failures[0].pair, 1);
    assert!(poses.skipped.is_empty());
    assert_eq!(poses.inliers, [(0, 12)]);
    assert!(sfm.pose(1).is_some());
    assert!(sfm.pose(2).is_none());
    assert!(sfm.state().edge(1).is_none());

    let tri = sfm.triangulate().unwrap();
    assert_eq!(tri.points, [(0, 12)]);
    assert_eq!(sfm.cloud().len(), 12);
}

#[test]
fn three_views_chain_relative_motions() {
    let scene = volume_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let step = second_camera();
    let truth = [CameraPose::identity(), step, step.then(&step)];
    let frames = truth.iter().map(|pose| Some(observe(pose, &scene, &ids))).collect();

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images((0..3).map(|_| solid_image([200, 100, 50])).collect()).unwrap();
    sfm.detect_features().unwrap();
    sfm.match_features().unwrap();

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 3);
    assert!(poses.failures.is_empty());
    assert_eq!(poses.inliers, [(0, 30), (1, 30)]);

    // Both steps share one baseline, so a single scale maps the chain onto
    // the true trajectory
    let scale = step.translation.norm();
    for (index, expected) in truth.iter().enumerate() {
        let pose = sfm.pose(index).copied().unwrap();
        assert!(rotation_angle(&pose, expected) < 1e-3, "image {}", index);
        let err = (pose.translation * scale - expected.translation).norm();
        assert!(err < 1e-3, "image {}: translation off by {}", index, err);
    }

    let tri = sfm.triangulate().unwrap();
    assert_eq!(tri.points, [(0, 30), (1, 30)]);
    for (p, expected) in sfm.cloud().iter().zip(scene.iter().chain(&scene)) {
        let recovered = p.position.coords * scale;
        assert!((recovered - expected.coords).norm() < 1e-2, "{:?} vs {:?}", recovered, expected);
    }
}

#[test]
fn rotation_without_baseline_is_not_posed() {
    let scene = planar_scene();
    let ids: Vec<usize> = (0..scene.len()).collect();
    let turned = CameraPose::new(Rotation3::from_euler_angles(0.0, 0.05, 0.0).into_inner(), Vector3::zeros());
    let frames = vec![
        Some(observe(&CameraPose::identity(), &scene, &ids)),
        Some(observe(&turned, &scene, &ids)),
    ];

    let mut sfm = Reconstruction::with_backend(config(), ScriptedBackend::boxed(frames)).unwrap();
    sfm.add_images(vec![solid_image([9, 9, 9]), solid_image([9, 9, 9])]).unwrap();
    sfm.detect_features().unwrap();
    assert_eq!(sfm.match_features().unwrap().matches, [12]);

    let poses = sfm.estimate_poses().unwrap();
    assert_eq!(poses.posed, 1);
    assert_eq!(poses.failures.len(), 1);
    assert_eq!(poses.failures[0].pair, 0);
    assert!(sfm.pose(1).is_none());

    assert_eq!(sfm.triangulate().unwrap().total_points(), 0);
    assert!(sfm.cloud().is_empty());
}

#[test]
fn custom_backend_config_is_validated() {
    let backend = || ScriptedBackend::boxed(Vec::new());

    let mut cfg = config();
    cfg.matching.min_matches = 0;
    assert!(matches!(Reconstruction::with_backend(cfg, backend()), Err(SfmError::Config(_))));

    let mut cfg = config();
    cfg.ransac.confidence = 7.0;
    assert!(matches!(Reconstruction::with_backend(cfg, backend()), Err(SfmError::Config(_))));

    let mut cfg = config();
    cfg.triangulation.max_reprojection_error = f64::NAN;
    assert!(matches!(Reconstruction::with_backend(cfg, backend()), Err(SfmError::Config(_))));

    let mut cfg = config();
    cfg.intrinsics.fx = 0.0;
    assert!(matches!(Reconstruction::with_backend(cfg, backend()), Err(SfmError::InvalidArgument(_))));

    assert!(Reconstruction::with_backend(config(), backend()).is_ok());
}

#[test]
fn invalid_intrinsics_are_rejected() {
    let mut cfg = config();
    cfg.intrinsics.fy = -1.0;
    assert!(matches!(Reconstruction::new(cfg), Err(SfmError::InvalidArgument(_))));
}

/// Real backend on synthetic frames: whatever the geometry yields, every
/// stage completes and the export is a valid PLY
#[test]
fn real_backend_runs_end_to_end() {
    let frame = |shift: usize| {
        let mut rgb = vec![40u8; WIDTH * HEIGHT * 3];
        for i in 0..60 {
            let (bx, by) = (30 + (i * 97) % 540 + shift, 30 + (i * 61) % 400);
            let (bw, bh) = (6 + i % 9, 5 + (i * 7) % 11);
            let v = 120 + ((i * 37) % 130) as u8;
            for y in by..(by + bh).min(HEIGHT) {
                for x in bx..(bx + bw).min(WIDTH) {
                    let o = (y * WIDTH + x) * 3;
                    rgb[o..o + 3].copy_from_slice(&[v, v / 2, 255 - v]);
                }
            }
        }
        Image::from_rgb(WIDTH, HEIGHT, rgb).unwrap()
    };

    let mut cfg = config();
    cfg.features.n_threads = 2;
    cfg.features.pyramid_levels = 2;
    cfg.features.max_features = 500;
    let mut sfm = Reconstruction::new(cfg).unwrap();
    sfm.add_images(vec![frame(0), frame(4)]).unwrap();

    let detected = sfm.detect_features().unwrap();
    assert!(detected.keypoints.iter().all(|&n| n > 0));
    sfm.match_features().unwrap();
    let poses = sfm.estimate_poses().unwrap();
    assert!(poses.posed >= 1);
    sfm.triangulate().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("real.ply");
    let n = sfm.export(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(&format!("element vertex {}\n", n)));
}
