//! Property tests for chunking, vector search, reranking and context assembly

use docent::chunking::{join_contents, normalize_whitespace, ChunkTag, Chunker};
use docent::embedding::VectorIndex;
use docent::error::DocentError;
use docent::retrieval::{ContextAssembler, LexicalReranker, Reranker};
use proptest::prelude::*;

const DIM: usize = 8;

fn arb_tag() -> impl Strategy<Value = ChunkTag> {
    prop_oneof![Just(ChunkTag::Text), Just(ChunkTag::Image)]
}

/// Small integer-valued components so exact score ties actually occur
fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec((-3i8..=3).prop_map(f32::from), dim)
}

fn arb_entries() -> impl Strategy<Value = Vec<(Vec<f32>, ChunkTag)>> {
    proptest::collection::vec((arb_vector(DIM), arb_tag()), 0..30)
}

fn arb_chunker() -> impl Strategy<Value = (usize, usize)> {
    (8usize..120).prop_flat_map(|max| (Just(max), 0..max))
}

mod prop_vector_search {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn returns_min_of_top_k_and_eligible(
            entries in arb_entries(),
            query in arb_vector(DIM),
            top_k in 0usize..40,
            filter in proptest::option::of(arb_tag()),
        ) {
            let eligible = entries
                .iter()
                .filter(|(_, tag)| filter.map_or(true, |f| *tag == f))
                .count();
            let index = VectorIndex::build(entries.clone()).unwrap();

            let hits = index.search(&query, top_k, filter).unwrap();

            prop_assert_eq!(hits.len(), top_k.min(eligible));
            if let Some(f) = filter {
                for hit in &hits {
                    prop_assert_eq!(entries[hit.index].1, f);
                }
            }
        }

        #[test]
        fn sorted_by_score_then_index(
            entries in arb_entries(),
            query in arb_vector(DIM),
            top_k in 1usize..40,
        ) {
            let index = VectorIndex::build(entries).unwrap();
            let hits = index.search(&query, top_k, None).unwrap();

            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].index < pair[1].index);
                }
            }
        }

        #[test]
        fn search_then_rerank_is_deterministic(
            entries in arb_entries(),
            query in arb_vector(DIM),
            words in proptest::collection::vec("[a-e]{2,4}", 1..6),
        ) {
            let index = VectorIndex::build(entries.clone()).unwrap();
            let candidates: Vec<String> = (0..entries.len())
                .map(|i| words[i % words.len()].repeat(i % 3 + 1))
                .collect();
            let reranker = LexicalReranker::new().unwrap();
            let question = words.join(" ");

            let run = || {
                let hits = index.search(&query, 10, None).unwrap();
                let texts: Vec<String> = hits.iter().map(|h| candidates[h.index].clone()).collect();
                let order = reranker.rerank(&question, &texts).unwrap();
                (hits, order)
            };

            prop_assert_eq!(run(), run());
        }

        #[test]
        fn query_dimension_mismatch_is_error(
            entries in proptest::collection::vec((arb_vector(DIM), arb_tag()), 1..10),
            query in arb_vector(DIM + 1),
            top_k in 0usize..10,
        ) {
            let index = VectorIndex::build(entries).unwrap();
            let result = index.search(&query, top_k, None);
            let is_mismatch = matches!(
                result,
                Err(DocentError::DimensionMismatch { expected, actual })
                    if expected == DIM && actual == DIM + 1
            );
            prop_assert!(is_mismatch);
        }
    }
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_fit_and_are_ordered(
            (max, overlap) in arb_chunker(),
            text in "[a-zA-Z.!?,éß \n\t]{0,600}",
        ) {
            let chunker = Chunker::new(max, overlap).unwrap();
            let chunks = chunker.chunk(&text);

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.tag, ChunkTag::Text);
                prop_assert!(chunk.char_len() <= max, "chunk {} has {} chars", i, chunk.char_len());
                prop_assert!(!chunk.content().trim().is_empty());
            }
        }

        #[test]
        fn rejoined_contents_match_normalized_input(
            (max, overlap) in arb_chunker(),
            text in "[a-zA-Z.!?,éß \n\t]{0,600}",
        ) {
            let chunker = Chunker::new(max, overlap).unwrap();
            let chunks = chunker.chunk(&text);

            prop_assert_eq!(
                normalize_whitespace(&join_contents(&chunks)),
                normalize_whitespace(&text)
            );
        }

        #[test]
        fn long_words_survive_hard_cuts(
            (max, overlap) in arb_chunker(),
            words in proptest::collection::vec("[a-z]{1,300}", 1..8),
        ) {
            let text = words.join(" ");
            let chunker = Chunker::new(max, overlap).unwrap();
            let chunks = chunker.chunk(&text);

            prop_assert!(chunks.iter().all(|c| c.char_len() <= max));
            prop_assert_eq!(join_contents(&chunks), text);
        }

        #[test]
        fn whitespace_only_yields_nothing(text in "[ \n\t\r]{0,50}") {
            let chunker = Chunker::new(50, 10).unwrap();
            prop_assert!(chunker.chunk(&text).is_empty());
        }

        #[test]
        fn chunking_is_deterministic(
            (max, overlap) in arb_chunker(),
            text in "[a-z .\n]{0,400}",
        ) {
            let chunker = Chunker::new(max, overlap).unwrap();
            prop_assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
        }
    }
}

mod prop_context {
    use super::*;

    proptest! {
        #[test]
        fn never_exceeds_max_units(
            max_units in 0usize..8,
            texts in proptest::collection::vec("[a-z ]{0,30}", 0..12),
        ) {
            let assembler = ContextAssembler::new(max_units, 100, "\n\n");
            let context = assembler.assemble(&texts);

            prop_assert_eq!(context.units, max_units.min(texts.len()));
            prop_assert_eq!(context.sparse, context.char_len() < 100);
        }
    }
}

#[test]
fn test_nearest_animals_scenario() {
    // A = "cats are mammals", B = "dogs are mammals", C = "stars are hot"
    let index = VectorIndex::build(vec![
        (vec![1.0, 0.0, 0.0], ChunkTag::Text),
        (vec![0.0, 1.0, 0.0], ChunkTag::Text),
        (vec![0.0, 0.0, 1.0], ChunkTag::Text),
    ])
    .unwrap();

    let hits = index.search(&[0.9, 0.4, 0.1], 2, None).unwrap();
    let order: Vec<usize> = hits.iter().map(|h| h.index).collect();

    assert_eq!(order, vec![0, 1]);
}

#[test]
fn test_image_filter_on_text_only_index() {
    let index = VectorIndex::build(vec![
        (vec![1.0, 0.0], ChunkTag::Text),
        (vec![0.0, 1.0], ChunkTag::Text),
    ])
    .unwrap();

    let hits = index.search(&[1.0, 1.0], 5, Some(ChunkTag::Image)).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_rerank_empty_candidates() {
    let reranker = LexicalReranker::new().unwrap();
    assert!(reranker.rerank("cats", &[]).unwrap().is_empty());
}
