//! Lockstep comparison against `im::Vector`, an independent RRB-tree
//! implementation, over long random operation sequences.

use canopy::mem::SharedMemory;
use canopy::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn run_sequence<const BRANCH: usize, const EXTRA: usize>(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut subject: Vector<u64, SharedMemory, BRANCH, EXTRA> = Vector::new();
    let mut model: im::Vector<u64> = im::Vector::new();

    for step in 0..steps {
        match rng.gen_range(0..6) {
            0 => {
                let x = rng.gen::<u64>();
                subject = subject.push_back(x);
                model.push_back(x);
            }
            1 => {
                let x = rng.gen::<u64>();
                subject = subject.push_front(x);
                model.push_front(x);
            }
            2 => {
                if !model.is_empty() {
                    let i = rng.gen_range(0..model.len());
                    let x = rng.gen::<u64>();
                    subject = subject.set(i, x);
                    let _ = model.set(i, x);
                }
            }
            3 => {
                let n = rng.gen_range(0..=model.len());
                subject = subject.take(n);
                model = model.take(n);
            }
            4 => {
                let n = rng.gen_range(0..=model.len());
                subject = subject.skip(n);
                model = model.skip(n);
            }
            _ => {
                let extra: Vec<u64> = (0..rng.gen_range(0..50)).map(|_| rng.gen()).collect();
                let other: Vector<u64, SharedMemory, BRANCH, EXTRA> =
                    extra.iter().copied().collect();
                subject = subject.concat(&other);
                model.append(extra.into_iter().collect());
            }
        }

        subject.check_invariants();
        assert_eq!(subject.len(), model.len(), "length diverged at step {step}");
        if step % 16 == 0 || step + 1 == steps {
            assert!(
                itertools::equal(subject.iter(), model.iter()),
                "contents diverged at step {step}"
            );
        }
    }
}

#[test]
fn random_ops_branch_2() {
    run_sequence::<2, 2>(0xC0FFEE, 600);
}

#[test]
fn random_ops_branch_4() {
    run_sequence::<4, 2>(0xBEEF, 800);
}

#[test]
fn random_ops_branch_4_no_slack() {
    run_sequence::<4, 0>(0xFACADE, 600);
}

#[test]
fn random_ops_default_branch() {
    run_sequence::<32, 2>(0xDECAF, 800);
}

#[test]
fn bulk_build_matches_oracle() {
    let values: Vec<u64> = (0..40_000).map(|i| i * 7 + 1).collect();
    let subject: Vector<u64> = values.iter().copied().collect();
    let model: im::Vector<u64> = values.iter().copied().collect();
    subject.check_invariants();
    assert!(itertools::equal(subject.iter(), model.iter()));
}
