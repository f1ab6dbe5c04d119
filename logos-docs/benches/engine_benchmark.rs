use criterion::{black_box, criterion_group, criterion_main, Criterion};
use logos_docs::comments::{reanchor, Comment};
use logos_docs::lines::LineRange;
use logos_docs::presence::PresenceTracker;
use logos_docs::storage::codec;
use logos_docs::{AgentId, DocumentEngine, DocumentId, EngineConfig, StoreConfig};
use std::collections::HashMap;

fn sample_content(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("line {i}: the quick brown fox jumps over the lazy dog"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_replace_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = DocumentEngine::new(EngineConfig::default());
    let editor = AgentId::new("editor");
    let id = rt.block_on(async {
        engine
            .create_document(&editor, "Bench", &sample_content(1000), HashMap::new())
            .await
            .unwrap()
            .document_id
    });

    c.bench_function("replace_lines_1000_line_doc", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = engine
                    .replace_lines(
                        &editor,
                        id,
                        black_box(500),
                        black_box(500),
                        vec!["edited".to_string()],
                        None,
                    )
                    .await
                    .unwrap();
                black_box(result);
            });
        })
    });
}

fn bench_persistent_replace_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_storage(StoreConfig::for_testing(dir.path()));
    let engine = DocumentEngine::open(config).unwrap();
    let editor = AgentId::new("editor");
    let id = rt.block_on(async {
        engine
            .create_document(&editor, "Bench", &sample_content(100), HashMap::new())
            .await
            .unwrap()
            .document_id
    });

    c.bench_function("replace_lines_rocksdb", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = engine
                    .replace_lines(&editor, id, 50, 50, vec!["edited".to_string()], None)
                    .await
                    .unwrap();
                black_box(result);
            });
        })
    });
}

fn bench_codec_encode(c: &mut Criterion) {
    let lines: Vec<String> = sample_content(1000).split('\n').map(String::from).collect();

    c.bench_function("codec_encode_1000_lines", |b| {
        b.iter(|| black_box(codec::encode(black_box(&lines)).unwrap()))
    });
}

fn bench_codec_decode(c: &mut Criterion) {
    let lines: Vec<String> = sample_content(1000).split('\n').map(String::from).collect();
    let frame = codec::encode(&lines).unwrap();

    c.bench_function("codec_decode_1000_lines", |b| {
        b.iter(|| black_box(codec::decode::<Vec<String>>(black_box(&frame)).unwrap()))
    });
}

fn bench_reanchor_1000_comments(c: &mut Criterion) {
    let doc = DocumentId::new();
    let author = AgentId::new("reviewer");
    let comments: Vec<Comment> = (1..=1000)
        .map(|line| Comment::new(doc, line, author.clone(), "note".to_string()))
        .collect();
    let range = LineRange::new(400, 410, 1000).unwrap();

    c.bench_function("reanchor_1000_comments", |b| {
        b.iter(|| {
            let mut comments = comments.clone();
            reanchor(&mut comments, black_box(range), black_box(-5), 995);
            black_box(comments);
        })
    });
}

fn bench_replay_500_operations(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = DocumentEngine::new(EngineConfig::default());
    let editor = AgentId::new("editor");
    let id = rt.block_on(async {
        let id = engine
            .create_document(&editor, "Bench", &sample_content(200), HashMap::new())
            .await
            .unwrap()
            .document_id;
        for i in 0..500usize {
            let line = i % 200 + 1;
            engine
                .replace_lines(&editor, id, line, line, vec![format!("rev {i}")], None)
                .await
                .unwrap();
        }
        id
    });

    c.bench_function("replay_500_operations", |b| {
        b.iter(|| {
            rt.block_on(async {
                let lines = engine
                    .get_document_at_version(&editor, id, black_box(501))
                    .await
                    .unwrap();
                black_box(lines);
            });
        })
    });
}

fn bench_presence_active_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let tracker = PresenceTracker::default();
    for i in 0..100 {
        tracker.update(AgentId::new(format!("agent{i}")), i + 1, 1);
    }

    c.bench_function("presence_active_100_cursors", |b| {
        b.iter(|| black_box(tracker.active()))
    });
}

criterion_group!(
    benches,
    bench_replace_lines,
    bench_persistent_replace_lines,
    bench_codec_encode,
    bench_codec_decode,
    bench_reanchor_1000_comments,
    bench_replay_500_operations,
    bench_presence_active_100,
);
criterion_main!(benches);
