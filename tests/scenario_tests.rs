// End-to-end scenarios driving the public crate API the way `fz run` does,
// without going through the CLI process.

use indexmap::IndexMap;

use fz_core::case::{Case, CaseSpec, VarSpecEntry};
use fz_core::model::Model;
use fz_core::result_set::CaseStatus;
use fz_core::scheduler::{self, RunOptions};
use fz_core::shutdown::ShutdownFlag;
use fz_core::value::Value;

fn mapping(pairs: Vec<(&str, VarSpecEntry)>) -> CaseSpec {
    let mut m = IndexMap::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v);
    }
    CaseSpec::Mapping(m)
}

fn run_opts<'a>(
    input_path: &'a std::path::Path,
    model: &'a Model,
    run_dir: &'a std::path::Path,
    calculator_uris: &'a [String],
) -> RunOptions<'a> {
    RunOptions {
        input_path,
        model,
        run_dir,
        calculator_uris,
        retry_bound: 3,
        env_default_timeout: 60,
        max_workers: 4,
        shutdown: ShutdownFlag::new(),
        observers: vec![],
    }
}

#[test]
fn identity_substitution_writes_compiled_file_and_records_input() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "x=$x\n").unwrap();

    let spec = mapping(vec![("x", VarSpecEntry::Scalar(Value::Int(42)))]);
    let cases = fz_core::case::expand(&spec).unwrap();
    assert_eq!(cases.len(), 1);

    let run_dir = tempfile::tempdir().unwrap();
    let model = Model::default();
    let opts = run_opts(input_dir.path(), &model, run_dir.path(), &["sh://cat input.txt".to_string()]);
    let result_set = scheduler::run(&cases, opts).unwrap();

    assert_eq!(result_set.rows.len(), 1);
    let row = &result_set.rows[0];
    assert_eq!(row.status, CaseStatus::Done);
    assert_eq!(row.inputs.get("x"), Some(&Value::Int(42)));

    let compiled = std::fs::read_to_string(std::path::Path::new(&row.path).join("input.txt")).unwrap();
    assert_eq!(compiled, "x=42\n");
}

#[test]
fn factorial_expansion_creates_one_case_per_combination() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "$a\n$b\n").unwrap();

    let spec = mapping(vec![
        ("a", VarSpecEntry::Sequence(vec![Value::Int(1), Value::Int(2)])),
        ("b", VarSpecEntry::Sequence(vec![Value::Int(10), Value::Int(20)])),
    ]);
    let cases = fz_core::case::expand(&spec).unwrap();

    let run_dir = tempfile::tempdir().unwrap();
    let model = Model::default();
    let opts = run_opts(input_dir.path(), &model, run_dir.path(), &["sh://true".to_string()]);
    let result_set = scheduler::run(&cases, opts).unwrap();

    assert_eq!(result_set.rows.len(), 4);
    assert!(result_set.rows.iter().all(|r| r.status == CaseStatus::Done));

    let mut dir_names: Vec<String> = std::fs::read_dir(run_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    dir_names.sort();
    assert_eq!(dir_names, vec!["a=1,b=10", "a=1,b=20", "a=2,b=10", "a=2,b=20"]);
}

#[test]
fn embedded_expression_is_evaluated_at_compile_time() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        input_dir.path().join("input.txt"),
        "T=$T\n#@ k = $T + 273.15\nTK=@{k}\n",
    )
    .unwrap();

    let mut values = IndexMap::new();
    values.insert("T".to_string(), Value::Int(25));
    let cases = vec![Case::new(values)];

    let run_dir = tempfile::tempdir().unwrap();
    let model = Model::default();
    let opts = run_opts(input_dir.path(), &model, run_dir.path(), &["sh://true".to_string()]);
    let result_set = scheduler::run(&cases, opts).unwrap();

    assert_eq!(result_set.rows[0].status, CaseStatus::Done);
    let compiled = std::fs::read_to_string(std::path::Path::new(&result_set.rows[0].path).join("input.txt")).unwrap();
    assert!(compiled.contains("TK=298.15"), "compiled file was: {compiled}");
}

#[test]
fn fallback_chain_reports_second_calculator_and_extracted_output() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "$x\n").unwrap();

    let spec = mapping(vec![(
        "x",
        VarSpecEntry::Sequence(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    )]);
    let cases = fz_core::case::expand(&spec).unwrap();

    let run_dir = tempfile::tempdir().unwrap();
    let mut model = Model::default();
    model.output.insert("result".to_string(), "cat output.txt".to_string());

    let calculators = vec!["sh://false".to_string(), "sh://echo ok>output.txt".to_string()];
    let opts = run_opts(input_dir.path(), &model, run_dir.path(), &calculators);
    let mut result_set = scheduler::run(&cases, opts).unwrap();
    scheduler::populate_outputs(&mut result_set, &model).unwrap();

    assert_eq!(result_set.rows.len(), 3);
    for row in &result_set.rows {
        assert_eq!(row.status, CaseStatus::Done);
        assert_eq!(row.calculator, "sh://echo ok>output.txt");
        assert_eq!(row.outputs.get("result"), Some(&Value::Str("ok".to_string())));
    }
}

#[test]
fn cache_hit_on_literal_run_dir_skips_the_fallback_calculator() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "$a\n$b\n").unwrap();

    let spec = mapping(vec![
        ("a", VarSpecEntry::Sequence(vec![Value::Int(1), Value::Int(2)])),
        ("b", VarSpecEntry::Sequence(vec![Value::Int(10), Value::Int(20)])),
    ]);
    let cases = fz_core::case::expand(&spec).unwrap();

    let first_run_dir = tempfile::tempdir().unwrap();
    let mut model = Model::default();
    model.output.insert("result".to_string(), "echo ok".to_string());
    let first_opts = run_opts(input_dir.path(), &model, first_run_dir.path(), &["sh://true".to_string()]);
    let first_result = scheduler::run(&cases, first_opts).unwrap();
    assert!(first_result.rows.iter().all(|r| r.status == CaseStatus::Done));

    // Re-run the same case set against `[cache://<first_run_dir>, sh://false]`
    // (§8 scenario 4: the literal run-directory form, not `.../*`). Every
    // case must come back `status="cached"` and `sh://false` must never run.
    let second_run_dir = tempfile::tempdir().unwrap();
    let cache_uri = format!("cache://{}", first_run_dir.path().display());
    let calculators = vec![cache_uri, "sh://false".to_string()];
    let second_opts = run_opts(input_dir.path(), &model, second_run_dir.path(), &calculators);
    let mut second_result = scheduler::run(&cases, second_opts).unwrap();
    scheduler::populate_outputs(&mut second_result, &model).unwrap();

    assert_eq!(second_result.rows.len(), 4);
    for row in &second_result.rows {
        assert_eq!(row.status, CaseStatus::Cached, "row for {:?} was not cached", row.inputs);
        assert_eq!(row.outputs.get("result"), Some(&Value::Str("ok".to_string())));
    }
}

#[test]
fn interrupted_run_yields_one_row_per_case_all_terminal() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "$x\n").unwrap();

    let spec = mapping(vec![(
        "x",
        VarSpecEntry::Sequence((0..20i64).map(Value::Int).collect()),
    )]);
    let cases = fz_core::case::expand(&spec).unwrap();

    let run_dir = tempfile::tempdir().unwrap();
    let model = Model::default();
    let flag = ShutdownFlag::new();
    flag.set();

    let opts = RunOptions {
        input_path: input_dir.path(),
        model: &model,
        run_dir: run_dir.path(),
        calculator_uris: &["sh://true".to_string()],
        retry_bound: 3,
        env_default_timeout: 60,
        max_workers: 4,
        shutdown: flag,
        observers: vec![],
    };
    let result_set = scheduler::run(&cases, opts).unwrap();

    assert_eq!(result_set.rows.len(), 20);
    assert!(result_set
        .rows
        .iter()
        .all(|r| matches!(r.status, CaseStatus::Interrupted | CaseStatus::Done | CaseStatus::Failed)));
}

#[test]
fn interrupted_run_can_be_resumed_through_cache_plus_fallback() {
    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("input.txt"), "$x\n").unwrap();

    let spec = mapping(vec![(
        "x",
        VarSpecEntry::Sequence((0..5i64).map(Value::Int).collect()),
    )]);
    let cases = fz_core::case::expand(&spec).unwrap();

    // First run: interrupted immediately, so every case directory gets
    // materialized (compiled inputs + fingerprint sidecar) but the declared
    // output's source file (`output.txt`, written by a real execution) is
    // never produced.
    let first_run_dir = tempfile::tempdir().unwrap();
    let mut model = Model::default();
    model.output.insert("result".to_string(), "cat output.txt".to_string());
    let flag = ShutdownFlag::new();
    flag.set();
    let first_opts = RunOptions {
        input_path: input_dir.path(),
        model: &model,
        run_dir: first_run_dir.path(),
        calculator_uris: &["sh://sleep 60".to_string()],
        retry_bound: 3,
        env_default_timeout: 60,
        max_workers: 4,
        shutdown: flag,
        observers: vec![],
    };
    let first_result = scheduler::run(&cases, first_opts).unwrap();
    assert_eq!(first_result.rows.len(), 5);
    assert!(first_result.rows.iter().all(|r| r.status == CaseStatus::Interrupted));

    // Second run (§8 scenario 6): `[cache://<first run>, sh://echo done>output.txt]`
    // with a fresh (unset) shutdown flag. The candidate's fingerprint matches
    // (same compiled inputs) but its declared output extracts as null
    // (`output.txt` was never written), so the cache rejects the hit and
    // every case falls through to, and completes via, the fallback
    // calculator.
    let second_run_dir = tempfile::tempdir().unwrap();
    let cache_uri = format!("cache://{}", first_run_dir.path().display());
    let calculators = vec![cache_uri, "sh://echo done>output.txt".to_string()];
    let second_opts = run_opts(input_dir.path(), &model, second_run_dir.path(), &calculators);
    let second_result = scheduler::run(&cases, second_opts).unwrap();

    assert_eq!(second_result.rows.len(), 5);
    for row in &second_result.rows {
        assert_eq!(row.status, CaseStatus::Done);
        assert_eq!(row.calculator, "sh://echo done>output.txt");
    }
}
