//! End-to-end scenarios: concrete small blocks with known KL data,
//! persistence round trips, and cell decompositions.

use std::collections::HashMap;

use klv_core::block::{BlockBuilder, BlockData, DescentStatus::*};
use klv_core::filekl::{
    read_block_file, read_coef_file, read_matrix_file, write_block_file, write_coef_file,
    write_matrix_file, FileKlView,
};
use klv_core::twisted::{DeltaBlockData, TwistedKlContext};
use klv_core::{BlockElt, KlContext, UNDEF_BLOCK, WGraph};

fn inversions(w: &[u8]) -> u32 {
    let mut inv = 0;
    for i in 0..w.len() {
        for j in i + 1..w.len() {
            if w[i] > w[j] {
                inv += 1;
            }
        }
    }
    inv
}

fn all_perms(n: usize) -> Vec<Vec<u8>> {
    let mut out = vec![vec![]];
    for _ in 0..n {
        let mut next = Vec::new();
        for p in out {
            for v in 0..n as u8 {
                if !p.contains(&v) {
                    let mut q = p.clone();
                    q.push(v);
                    next.push(q);
                }
            }
        }
        out = next;
    }
    out
}

/// Block of the rank `n-1` complex group: elements are permutations of
/// `S_n`, one generator per left and per right multiplication, every status
/// complex. Its KL data is the classical one for `S_n`.
fn symmetric_block(n: usize) -> (BlockData, HashMap<Vec<u8>, BlockElt>) {
    let mut perms = all_perms(n);
    perms.sort_by_key(|p| (inversions(p), p.clone()));
    let id_of: HashMap<Vec<u8>, BlockElt> = perms
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), i as BlockElt))
        .collect();

    let rank = 2 * (n - 1);
    let mut b = BlockBuilder::new(rank);
    for p in &perms {
        b.add(inversions(p));
    }
    for (i, p) in perms.iter().enumerate() {
        for k in 0..n - 1 {
            // left: exchange the values k and k+1
            let left: Vec<u8> = p
                .iter()
                .map(|&v| match v {
                    v if v == k as u8 => k as u8 + 1,
                    v if v == k as u8 + 1 => k as u8,
                    v => v,
                })
                .collect();
            // right: exchange the positions k and k+1
            let mut right = p.clone();
            right.swap(k, k + 1);

            for (s, img) in [(k, left), (n - 1 + k, right)] {
                let j = id_of[&img];
                let status = if inversions(&img) > inversions(p) {
                    ComplexAscent
                } else {
                    ComplexDescent
                };
                b.set(s, i as BlockElt, status, j);
            }
        }
    }
    (b.build().unwrap(), id_of)
}

/// Split real form of type A2: four elements, lengths 0, 1, 1, 2.
fn split_a2() -> BlockData {
    let mut b = BlockBuilder::new(2);
    let z0 = b.add(0);
    let z1 = b.add(1);
    let z2 = b.add(1);
    let z3 = b.add(2);
    b.set(0, z0, ComplexAscent, z1);
    b.set(1, z0, ComplexAscent, z2);
    b.set(0, z1, ComplexDescent, z0);
    b.set(1, z1, ImaginaryTypeI, z1);
    b.set_cayley(1, z1, z3, UNDEF_BLOCK);
    b.set(1, z2, ComplexDescent, z0);
    b.set(0, z2, ImaginaryTypeI, z2);
    b.set_cayley(0, z2, z3, UNDEF_BLOCK);
    b.set(0, z3, RealTypeI, z3);
    b.set(1, z3, RealTypeI, z3);
    b.build().unwrap()
}

/// Split A1 with two elements (the scenario block).
fn split_a1() -> BlockData {
    let mut b = BlockBuilder::new(1);
    let x0 = b.add(0);
    let x1 = b.add(1);
    b.set(0, x0, ImaginaryTypeI, x0);
    b.set_cayley(0, x0, x1, UNDEF_BLOCK);
    b.set(0, x1, RealTypeI, x1);
    b.build().unwrap()
}

#[test]
fn split_a2_polynomials_are_constant() {
    let blk = split_a2();
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();
    for y in 0..4 {
        for x in 0..=y {
            let p = ctx.kl_pol(x, y).unwrap();
            if !p.is_zero() {
                assert_eq!(p.degree(), Some(0), "P({x},{y}) must be constant");
                assert_eq!(p.coef_at(0), 1);
            }
        }
        for x in 0..=y {
            assert!(ctx.mu(x, y).unwrap() <= 1);
        }
    }
    assert_eq!(ctx.kl_pol(0, 3).unwrap().coef_at(0), 1);
    assert_eq!(ctx.mu(1, 3).unwrap(), 1);
    assert_eq!(ctx.mu(2, 3).unwrap(), 1);
    assert_eq!(ctx.mu(0, 1).unwrap(), 1);
    assert_eq!(ctx.mu(0, 3).unwrap(), 0); // even length gap

    // the cells of this block are four singletons
    let dec = WGraph::from_kl(&ctx).unwrap().cells();
    assert_eq!(dec.cell_count(), 4);
}

#[test]
fn symmetric_group_four_matches_classical_tables() {
    let (blk, id_of) = symmetric_block(4);
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();
    assert!(ctx.is_filled());
    let n = ctx.size();

    // diagonal and triangularity
    for y in 0..n {
        let p = ctx.kl_pol(y, y).unwrap();
        assert_eq!(p.degree(), Some(0));
        assert_eq!(p.coef_at(0), 1);
        for x in y + 1..n {
            assert!(ctx.kl_pol(x, y).unwrap().is_zero());
        }
    }

    // degree bounds, strict at even gaps
    for y in 0..n {
        for &x in ctx.primitive_row(y) {
            let gap = ctx.length(y) - ctx.length(x);
            let p = ctx.kl_pol(x, y).unwrap();
            if let Some(d) = p.degree() {
                if gap % 2 == 0 && gap > 0 {
                    assert!(2 * d < gap as usize, "P({x},{y}) degree");
                } else {
                    assert!(2 * d <= gap as usize, "P({x},{y}) degree");
                }
            }
        }
    }

    // the singular Schubert variety of 3412: P(e, 3412) = q + 1
    let e = id_of[&vec![0u8, 1, 2, 3]];
    let w = id_of[&vec![2u8, 3, 0, 1]];
    let p = ctx.kl_pol(e, w).unwrap();
    assert_eq!(p.degree(), Some(1));
    assert_eq!(p.coef_at(0), 1);
    assert_eq!(p.coef_at(1), 1);

    // classical S4 data needs exactly the polynomials 0, 1 and q + 1
    assert_eq!(ctx.pol_store().len(), 3);

    // mu values stay in {0, 1}
    for y in 0..n {
        for &(_, m) in ctx.mu_row(y) {
            assert_eq!(m, 1);
        }
    }

    // covers have mu one
    let s1 = id_of[&vec![1u8, 0, 2, 3]];
    assert_eq!(ctx.mu(e, s1).unwrap(), 1);
}

#[test]
fn symmetric_group_three_cell_decomposition() {
    let (blk, _) = symmetric_block(3);
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();
    let dec = WGraph::from_kl(&ctx).unwrap().cells();
    // two-sided cells of the rank two complex group
    assert_eq!(dec.cell_count(), 3);
    let mut sizes: Vec<_> = (0..3).map(|c| dec.cell_members(c).len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 1, 4]);
}

#[test]
fn rank_one_split_cells() {
    let blk = split_a1();
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();
    let dec = WGraph::from_kl(&ctx).unwrap().cells();
    assert_eq!(dec.cell_count(), 2);
    assert_eq!(dec.cell_members(0).len(), 1);
    assert_eq!(dec.cell_members(1).len(), 1);
}

#[test]
fn persistence_round_trip() {
    let (blk, _) = symmetric_block(4);
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();

    let dir = std::env::temp_dir().join("klv_core_tests").join("round_trip");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let bp = dir.join("block.bin");
    let mp = dir.join("matrix.bin");
    let cp = dir.join("coef.bin");

    {
        let mut bf = std::fs::File::create(&bp).unwrap();
        write_block_file(&blk, &mut bf).unwrap();
        let mut mf = std::fs::File::create(&mp).unwrap();
        write_matrix_file(&ctx, &mut mf).unwrap();
        let mut cf = std::fs::File::create(&cp).unwrap();
        write_coef_file(&ctx, &mut cf).unwrap();
    }

    let view = FileKlView::new(
        read_block_file(&mut std::fs::File::open(&bp).unwrap()).unwrap(),
        read_matrix_file(&mut std::fs::File::open(&mp).unwrap()).unwrap(),
        read_coef_file(&mut std::fs::File::open(&cp).unwrap()).unwrap(),
    )
    .unwrap();

    let n = ctx.size();
    for y in 0..n {
        for x in 0..n {
            assert_eq!(
                *view.kl_pol(x, y),
                ctx.kl_pol(x, y).unwrap().to_poly(),
                "P({x},{y}) after reload"
            );
        }
        for x in 0..y {
            assert_eq!(view.mu(x, y), ctx.mu(x, y).unwrap(), "mu({x},{y}) after reload");
        }
    }

    // the two extraction paths agree edge for edge
    let mem = WGraph::from_kl(&ctx).unwrap();
    let disk = view.wgraph();
    assert_eq!(mem.edge_multiset(), disk.edge_multiset());
}

#[test]
fn flat_block_has_no_row_loop() {
    // two incomparable elements of length zero, rank zero
    let mut b = BlockBuilder::new(0);
    b.add(0);
    b.add(0);
    let blk = b.build().unwrap();
    let mut ctx = KlContext::new(&blk).unwrap();
    ctx.fill().unwrap();
    assert!(ctx.kl_pol(0, 1).unwrap().is_zero());
    assert_eq!(ctx.kl_pol(1, 1).unwrap().coef_at(0), 1);
}

#[test]
fn twisted_complex_flip_scenario() {
    // delta-fixed sub-block of the complex A2 x A2 group under the flip:
    // the four involutions of the Weyl group
    let blk = DeltaBlockData::new(
        2,
        vec![0, 1, 1, 3],
        vec![1, 2, 0, 3, 3, 0, 2, 1],
    )
    .unwrap();
    let mut ctx = TwistedKlContext::new(&blk).unwrap();
    ctx.fill().unwrap();

    // leading coefficients positive, and the sub-block mu tables match the
    // combinatorial prediction
    for p in ctx.pol_list() {
        if let Some(d) = p.degree() {
            assert!(p.coef_at(d) > 0);
        }
    }
    assert_eq!(ctx.mu(0, 1).unwrap(), 1);
    assert_eq!(ctx.mu(0, 2).unwrap(), 1);
    assert_eq!(ctx.mu_even(1, 3).unwrap(), 1);
    assert_eq!(ctx.mu_even(2, 3).unwrap(), 1);
    assert_eq!(ctx.kl_pol(0, 3).unwrap().coef_at(0), 1);
}
