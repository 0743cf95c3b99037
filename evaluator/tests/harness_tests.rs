use clap::Parser;
use evaluator::{read_queries, EvalArgs};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_fixture(dir: &Path) {
    fs::write(dir.join("corpus.dat"), "wing lift drag\nshock wave\nwing flutter\nheat transfer\n").unwrap();
    fs::write(dir.join("queries.txt"), "wing\nshock wave\nturbulence\n").unwrap();
    fs::write(dir.join("qrels.txt"), "1 0 1\n1 2 1\n2 1 2\n3 3 1\n").unwrap();
}

fn args(dir: &Path, extra: &[&str]) -> EvalArgs {
    let index = dir.join("idx");
    let corpus = dir.join("corpus.dat");
    let queries = dir.join("queries.txt");
    let qrels = dir.join("qrels.txt");
    let mut argv = vec![
        "evaluator".to_string(),
        "--index".into(),
        index.display().to_string(),
        "--corpus".into(),
        corpus.display().to_string(),
        "--queries".into(),
        queries.display().to_string(),
        "--qrels".into(),
        qrels.display().to_string(),
        "--query-id-start".into(),
        "1".into(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    EvalArgs::parse_from(argv)
}

#[test]
fn builds_index_then_reports_per_query_and_map() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let mut out = Vec::new();
    let report = evaluator::run(&args(dir.path(), &[]), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(dir.path().join("idx").join("meta.json").is_file());
    assert_eq!(report.queries.len(), 3);
    assert_eq!(report.queries[0].avg_precision, 1.0);
    assert_eq!(report.queries[1].avg_precision, 1.0);
    assert_eq!(report.queries[2].avg_precision, 0.0);
    assert!((report.map - 2.0 / 3.0).abs() < 1e-12);

    assert!(text.starts_with("Building or loading index...\nRunning queries\n"));
    assert!(text.contains("Query 1 average precision: 1\n"));
    assert!(text.contains("Query 3 average precision: 0\n"));
    assert!(text.contains("Mean average precision: 0.6666666666666666\n"));
    assert!(text.contains("Elapsed: "));
}

#[test]
fn second_run_loads_saved_index_with_same_results() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let first = evaluator::run(&args(dir.path(), &["--ranker", "bm25"]), &mut Vec::<u8>::new()).unwrap();
    // corpus is gone, so the saved index must be what answers
    fs::remove_file(dir.path().join("corpus.dat")).unwrap();
    let second = evaluator::run(&args(dir.path(), &["--ranker", "bm25"]), &mut Vec::<u8>::new()).unwrap();
    assert_eq!(first.queries, second.queries);
}

#[test]
fn invalid_ranker_parameter_is_fatal() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let err = evaluator::run(&args(dir.path(), &["--c", "0"]), &mut Vec::<u8>::new()).unwrap_err();
    assert!(format!("{err:#}").contains("invalid parameter c"));
}

#[test]
fn ranker_config_file_overrides_flags() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(dir.path().join("ranker.json"), r#"{"method":"pivoted-length","s":0.3}"#).unwrap();
    let cfg_path = dir.path().join("ranker.json").display().to_string();
    let a = args(dir.path(), &["--ranker-config", &cfg_path]);
    assert_eq!(a.ranker.config().unwrap(), ircore::RankerConfig::PivotedLength { s: 0.3 });
}

#[test]
fn missing_index_without_corpus_is_reported() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let argv: Vec<String> = vec![
        "evaluator".into(),
        "--index".into(),
        dir.path().join("none").display().to_string(),
        "--queries".into(),
        dir.path().join("queries.txt").display().to_string(),
        "--qrels".into(),
        dir.path().join("qrels.txt").display().to_string(),
    ];
    let a = EvalArgs::parse_from(argv);
    let err = evaluator::run(&a, &mut Vec::<u8>::new()).unwrap_err();
    assert!(err.to_string().contains("no index"));
}

#[test]
fn query_ids_follow_line_order() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let queries = read_queries(&dir.path().join("queries.txt"), 7).unwrap();
    let ids: Vec<u32> = queries.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![7, 8, 9]);
    assert_eq!(queries[1].1.length(), 2);
}

#[test]
fn index_saved_next_to_corpus_keeps_input_files() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let mut argv: Vec<String> = vec!["evaluator".into(), "--index".into(), dir.path().display().to_string()];
    for (flag, file) in [("--corpus", "corpus.dat"), ("--queries", "queries.txt"), ("--qrels", "qrels.txt")] {
        argv.push(flag.into());
        argv.push(dir.path().join(file).display().to_string());
    }
    argv.extend(["--query-id-start".into(), "1".into()]);
    let args = EvalArgs::parse_from(argv);

    let first = evaluator::run(&args, &mut Vec::<u8>::new()).unwrap();
    for file in ["corpus.dat", "queries.txt", "qrels.txt", "meta.json"] {
        assert!(dir.path().join(file).is_file(), "{file} missing after first run");
    }
    // the second run loads the index that now shares the directory
    let second = evaluator::run(&args, &mut Vec::<u8>::new()).unwrap();
    assert_eq!(first.map, second.map);
    assert_eq!(fs::read_to_string(dir.path().join("queries.txt")).unwrap(), "wing\nshock wave\nturbulence\n");
}
