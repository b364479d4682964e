//! End-to-end prove/verify behaviour over both backends.

use imgzkp::{
    Artifact, BackendKind, Claim, Dims, ErrorKind, PipelineConfig, PixelGrid, Proof,
    ProofArtifacts, TransformKind, TransformationPipeline, TransformationSpec, VerifyingKey,
};

const BACKENDS: [BackendKind; 2] = [BackendKind::Groth16, BackendKind::Plonk];

fn pipeline(backend: BackendKind, proof_dir: &std::path::Path) -> TransformationPipeline {
    TransformationPipeline::new(PipelineConfig {
        backend,
        proof_dir: proof_dir.to_path_buf(),
        ..Default::default()
    })
}

fn in_memory(backend: BackendKind) -> TransformationPipeline {
    TransformationPipeline::new(PipelineConfig { backend, ..Default::default() })
}

fn sample(h: usize, w: usize) -> PixelGrid {
    PixelGrid::from_fn(h, w, |r, c| {
        [(r * 61 + c * 7) as u8, (250 - c * 30) as u8, (r * 13 + 200) as u8]
    })
    .unwrap()
}

fn prove_applied(
    p: &TransformationPipeline,
    spec: TransformationSpec,
    original: &PixelGrid,
    crop: Option<Dims>,
) -> (PixelGrid, ProofArtifacts) {
    let final_grid = spec.apply(original, crop).unwrap();
    let artifacts = p.prove(spec, original, &final_grid).unwrap();
    (final_grid, artifacts)
}

fn accepts(p: &TransformationPipeline, claim: Claim, final_grid: &PixelGrid, a: &ProofArtifacts) -> bool {
    p.verify(&claim, final_grid, &a.proof, &a.verifying_key).unwrap()
}

#[test]
fn every_transform_proves_and_verifies() {
    let original = sample(2, 3);
    let cases = [
        (TransformationSpec::Crop { row_offset: 1, col_offset: 1 }, Some(Dims::new(1, 2))),
        (TransformationSpec::Rotate90, None),
        (TransformationSpec::Rotate180, None),
        (TransformationSpec::Rotate270, None),
        (TransformationSpec::FlipHorizontal, None),
        (TransformationSpec::FlipVertical, None),
        (TransformationSpec::Brighten { delta: -40 }, None),
        (TransformationSpec::Contrast { factor: 30 }, None),
    ];
    for backend in BACKENDS {
        let p = in_memory(backend);
        for (spec, crop) in cases {
            let (final_grid, artifacts) = prove_applied(&p, spec, &original, crop);
            assert!(accepts(&p, Claim::Exact(spec), &final_grid, &artifacts), "{backend} {spec}");
            assert!(accepts(&p, Claim::Kind(spec.kind()), &final_grid, &artifacts));
        }
    }
}

#[test]
fn single_channel_mutation_is_rejected() {
    let original = sample(3, 2);
    for backend in BACKENDS {
        let p = in_memory(backend);
        for spec in [TransformationSpec::Rotate270, TransformationSpec::Brighten { delta: 5 }] {
            let (final_grid, artifacts) = prove_applied(&p, spec, &original, None);
            let [r, g, b] = final_grid.get(1, 0).unwrap();
            let forged = final_grid.with_pixel(1, 0, [r, g, b.wrapping_add(1)]);
            assert!(!accepts(&p, Claim::Exact(spec), &forged, &artifacts), "{backend} {spec}");
        }
    }
}

#[test]
fn unrelated_final_image_is_rejected() {
    let original = sample(2, 2);
    let spec = TransformationSpec::FlipHorizontal;
    for backend in BACKENDS {
        let p = in_memory(backend);
        let (_, artifacts) = prove_applied(&p, spec, &original, None);
        let unrelated = PixelGrid::filled(2, 2, [9, 9, 9]).unwrap();
        assert!(!accepts(&p, Claim::Exact(spec), &unrelated, &artifacts));
    }
}

#[test]
fn four_quarter_turns_return_to_the_original() {
    for backend in BACKENDS {
        let p = in_memory(backend);
        let original = sample(2, 3);
        let mut current = original.clone();
        for _ in 0..4 {
            let (next, artifacts) =
                prove_applied(&p, TransformationSpec::Rotate90, &current, None);
            assert!(accepts(&p, Claim::Kind(TransformKind::Rotate90), &next, &artifacts));
            current = next;
        }
        assert_eq!(current, original);
    }
}

#[test]
fn full_window_crop_is_the_identity() {
    let original = sample(3, 3);
    let spec = TransformationSpec::Crop { row_offset: 0, col_offset: 0 };
    for backend in BACKENDS {
        let p = in_memory(backend);
        let artifacts = p.prove(spec, &original, &original).unwrap();
        assert!(accepts(&p, Claim::Exact(spec), &original, &artifacts));
    }
}

#[test]
fn brighten_saturates_instead_of_wrapping() {
    let original = PixelGrid::from_rows(vec![vec![[250, 0, 128], [255, 246, 10]]]).unwrap();
    let spec = TransformationSpec::Brighten { delta: 10 };
    for backend in BACKENDS {
        let p = in_memory(backend);
        let (clamped, artifacts) = prove_applied(&p, spec, &original, None);
        assert_eq!(clamped.get(0, 0), Some([255, 10, 138]));
        assert_eq!(clamped.get(0, 1), Some([255, 255, 20]));
        assert!(accepts(&p, Claim::Exact(spec), &clamped, &artifacts));

        let wrapped = clamped.with_pixel(0, 0, [250u8.wrapping_add(10), 10, 138]);
        assert!(!accepts(&p, Claim::Exact(spec), &wrapped, &artifacts));

        // an honest prover cannot produce a proof for the wrapped image either
        let err = p.prove(spec, &original, &wrapped).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }
}

#[test]
fn rotate90_requires_transposed_dimensions() {
    let original = sample(2, 3);
    for backend in BACKENDS {
        let p = in_memory(backend);
        let err = p.prove(TransformationSpec::Rotate90, &original, &original).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(err.stage(), imgzkp::Stage::Build);
    }
}

#[test]
fn all_zero_half_turn_scenario() {
    let original = PixelGrid::filled(4, 4, [0, 0, 0]).unwrap();
    let spec = TransformationSpec::Rotate180;
    for backend in BACKENDS {
        let p = in_memory(backend);
        let (final_grid, artifacts) = prove_applied(&p, spec, &original, None);
        assert_eq!(final_grid, original);
        assert!(accepts(&p, Claim::Exact(spec), &final_grid, &artifacts));

        let flipped = final_grid.with_pixel(2, 1, [0, 1, 0]);
        assert!(!accepts(&p, Claim::Exact(spec), &flipped, &artifacts));
    }
}

#[test]
fn artifacts_survive_the_codec() {
    let original = sample(2, 2);
    let spec = TransformationSpec::Contrast { factor: -20 };
    for backend in BACKENDS {
        let p = in_memory(backend);
        let (final_grid, artifacts) = prove_applied(&p, spec, &original, None);

        let proof_bytes = artifacts.proof.encode().unwrap();
        let vk_bytes = artifacts.verifying_key.encode().unwrap();
        let proof = Proof::decode(backend, &proof_bytes).unwrap();
        let vk = VerifyingKey::decode(backend, &vk_bytes).unwrap();
        assert_eq!(proof.encode().unwrap(), proof_bytes);
        assert_eq!(vk.encode().unwrap(), vk_bytes);
        assert!(p.verify(&Claim::Exact(spec), &final_grid, &proof, &vk).unwrap());
    }
}

#[test]
fn files_round_trip_through_the_proof_dir() {
    let dir = tempfile::tempdir().unwrap();
    let original_path = dir.path().join("original.png");
    let final_path = dir.path().join("final.png");
    let original = sample(3, 2);
    let spec = TransformationSpec::Crop { row_offset: 1, col_offset: 0 };
    original.save(&original_path).unwrap();
    spec.apply(&original, Some(Dims::new(2, 2))).unwrap().save(&final_path).unwrap();

    for backend in BACKENDS {
        let proofs = dir.path().join(backend.name());
        let p = pipeline(backend, &proofs);
        let report = p.prove_files(spec, &original_path, &final_path).unwrap();
        assert_eq!(report.dir, proofs.join("crop"));
        assert_eq!(report.final_dims, Dims::new(2, 2));
        assert!(report.dir.join(imgzkp::pipeline::PROOF_FILE).is_file());
        assert!(report.dir.join(imgzkp::pipeline::VKEY_FILE).is_file());

        let outcome = p.verify_files(&Claim::Kind(TransformKind::Crop), &final_path).unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.statement, spec);
        assert_eq!(outcome.statement.to_string(), "crop(row_offset=1, col_offset=0)");
        assert!(p.verify_files(&Claim::Exact(spec), &final_path).unwrap().accepted);

        let other = TransformationSpec::Crop { row_offset: 0, col_offset: 0 };
        let err = p.verify_files(&Claim::Exact(other), &final_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(matches!(err, imgzkp::PipelineError::StatementMismatch { .. }));
    }
}

#[test]
fn artifacts_of_the_other_backend_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let original_path = dir.path().join("original.png");
    let final_path = dir.path().join("final.png");
    let original = sample(2, 2);
    original.save(&original_path).unwrap();
    TransformationSpec::FlipVertical.apply(&original, None).unwrap().save(&final_path).unwrap();

    let groth16 = pipeline(BackendKind::Groth16, dir.path());
    groth16.prove_files(TransformationSpec::FlipVertical, &original_path, &final_path).unwrap();

    let plonk = pipeline(BackendKind::Plonk, dir.path());
    let claim = Claim::Kind(TransformKind::FlipVertical);
    let err = plonk.verify_files(&claim, &final_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptArtifact);

    // in memory, mismatched handles are also refused
    let (final_grid, artifacts) =
        prove_applied(&groth16, TransformationSpec::FlipVertical, &original, None);
    let err = plonk
        .verify(&claim, &final_grid, &artifacts.proof, &artifacts.verifying_key)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptArtifact);

    let vkey = groth16.artifact_dir(TransformKind::FlipVertical).join(imgzkp::pipeline::VKEY_FILE);
    let bytes = std::fs::read(&vkey).unwrap();
    std::fs::write(&vkey, &bytes[..bytes.len() / 2]).unwrap();
    let err = groth16.verify_files(&claim, &final_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptArtifact);
}

#[test]
fn missing_artifacts_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let final_path = dir.path().join("final.png");
    sample(1, 1).save(&final_path).unwrap();
    let p = pipeline(BackendKind::Groth16, dir.path());
    let err = p.verify_files(&Claim::Kind(TransformKind::Rotate180), &final_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn rejected_files_still_report_the_statement() {
    let dir = tempfile::tempdir().unwrap();
    let original_path = dir.path().join("original.png");
    let final_path = dir.path().join("final.png");
    let original = sample(2, 2);
    let spec = TransformationSpec::Brighten { delta: 40 };
    original.save(&original_path).unwrap();
    let final_grid = spec.apply(&original, None).unwrap();
    final_grid.save(&final_path).unwrap();

    let p = pipeline(BackendKind::Groth16, dir.path());
    p.prove_files(spec, &original_path, &final_path).unwrap();

    let [r, g, b] = final_grid.get(1, 0).unwrap();
    final_grid.with_pixel(1, 0, [r, g, b ^ 1]).save(&final_path).unwrap();
    let outcome = p.verify_files(&Claim::Kind(TransformKind::Brighten), &final_path).unwrap();
    assert!(!outcome.accepted);
    assert_eq!(outcome.statement.to_string(), "brighten(delta=40)");
}

#[test]
fn key_with_a_foreign_digest_is_a_circuit_mismatch() {
    for backend in BACKENDS {
        let p = in_memory(backend);
        let spec = TransformationSpec::FlipHorizontal;
        let (final_grid, mut artifacts) = prove_applied(&p, spec, &sample(2, 2), None);
        match &mut artifacts.verifying_key {
            VerifyingKey::Groth16(vk) => vk.digest[0] ^= 1,
            VerifyingKey::Plonk(vk) => vk.digest[0] ^= 1,
        }
        let err = p
            .verify(&Claim::Exact(spec), &final_grid, &artifacts.proof, &artifacts.verifying_key)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(matches!(
            err,
            imgzkp::PipelineError::Backend { source: imgzkp::backend::BackendError::CircuitMismatch, .. }
        ));
    }
}
