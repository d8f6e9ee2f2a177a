use async_trait::async_trait;
use relcheck::prompts::SUMMARY_INSTRUCTION;
use relcheck::{
    Article, CheckerConfig, Completion, ObjectStore, RelcheckError, RelevanceChecker, Result,
    StorageLocation,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FORMAT_PROMPT: &str = " Reply with JSON {\"relevant\": bool}.";

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Completion fake that records every prompt and answers via a closure.
struct ScriptedCompletion {
    prompts: Mutex<Vec<String>>,
    responder: Responder,
}

impl ScriptedCompletion {
    fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn summary_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.starts_with(SUMMARY_INSTRUCTION))
            .collect()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("slow") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        (self.responder)(prompt)
    }
}

/// In-memory object store keyed by (bucket, key).
#[derive(Default)]
struct MemoryStore {
    objects: HashMap<(String, String), String>,
}

impl MemoryStore {
    fn with_format_prompt() -> Self {
        let location = StorageLocation::default();
        let mut objects = HashMap::new();
        objects.insert((location.bucket, location.key), FORMAT_PROMPT.to_string());
        Self { objects }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, location: &StorageLocation) -> Result<Vec<u8>> {
        self.objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| RelcheckError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            })
    }
}

fn seeds(n: usize) -> Vec<Article> {
    (0..n)
        .map(|i| Article::new(format!("https://seed/{i}"), format!("seed text {i}")))
        .collect()
}

fn is_summary(prompt: &str) -> bool {
    prompt.starts_with(SUMMARY_INSTRUCTION)
}

fn article_count(prompt: &str) -> usize {
    prompt.matches(" Article ").count()
}

#[tokio::test]
async fn results_are_tagged_with_url_in_input_order() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok(" Interest rates.".to_string())
        } else {
            Ok(r#"{"relevant": true}"#.to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();

    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(2), CheckerConfig::default())
        .await
        .unwrap();

    let candidates = vec![Article::new("u1", "A"), Article::new("u2", "B")];
    let results = checker.check_relevancy(&candidates).await.unwrap();

    let as_json: Vec<Value> = results.into_iter().map(Value::Object).collect();
    assert_eq!(
        as_json,
        vec![
            json!({"relevant": true, "url": "u1"}),
            json!({"relevant": true, "url": "u2"}),
        ]
    );
}

#[tokio::test]
async fn candidate_prompt_concatenates_summary_format_and_text() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok(" Interest rates.".to_string())
        } else {
            Ok(r#"{"relevant": false}"#.to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();

    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(1), CheckerConfig::default())
        .await
        .unwrap();
    assert_eq!(checker.summary(), " Interest rates.");
    assert_eq!(checker.format_prompt(), FORMAT_PROMPT);

    checker
        .check_relevancy(&[Article::new("u1", "Dow slides")])
        .await
        .unwrap();

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(
        prompts[1],
        format!(
            "The following is the common theme from a list of articles. Interest rates.{} Candidate article: Dow slides",
            FORMAT_PROMPT
        )
    );
}

#[tokio::test]
async fn malformed_reply_aborts_whole_batch() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok("theme".to_string())
        } else if prompt.ends_with("bad") {
            Ok("Sorry, I can't judge this one.".to_string())
        } else {
            Ok(r#"{"relevant": true}"#.to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();
    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(1), CheckerConfig::default())
        .await
        .unwrap();

    let candidates = vec![
        Article::new("u1", "good"),
        Article::new("u2", "bad"),
        Article::new("u3", "good"),
    ];
    let err = checker.check_relevancy(&candidates).await.unwrap_err();
    match err {
        RelcheckError::MalformedResponse { url, .. } => assert_eq!(url, "u2"),
        other => panic!("unexpected error: {other:?}"),
    }

    // Sequential by default: the third candidate is never sent
    let candidate_calls = completion.prompts().iter().filter(|p| !is_summary(p)).count();
    assert_eq!(candidate_calls, 2);
}

#[tokio::test]
async fn invalid_json_between_braces_is_malformed() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok("theme".to_string())
        } else {
            Ok("{relevant: yes}".to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();
    let checker = RelevanceChecker::new(completion, &store, seeds(1), CheckerConfig::default())
        .await
        .unwrap();

    let err = checker
        .check_relevancy(&[Article::new("u1", "text")])
        .await
        .unwrap_err();
    assert!(matches!(err, RelcheckError::MalformedResponse { .. }));
}

#[tokio::test]
async fn seeds_are_truncated_to_capacity() {
    let completion = ScriptedCompletion::new(|_| Ok("theme".to_string()));
    let store = MemoryStore::with_format_prompt();

    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(15), CheckerConfig::default())
        .await
        .unwrap();
    assert_eq!(checker.seeds().len(), 10);

    let summary_prompts = completion.summary_prompts();
    assert_eq!(summary_prompts.len(), 1);
    let prompt = &summary_prompts[0];
    for i in 0..10 {
        assert!(prompt.contains(&format!("Article {i}: seed text {i}")), "missing seed {i}");
    }
    for i in 10..15 {
        assert!(!prompt.contains(&format!("seed text {i}")), "seed {i} should be dropped");
    }
}

#[tokio::test]
async fn oversized_summary_splits_into_more_folds() {
    // Any summary request carrying more than two articles is rejected
    let completion = ScriptedCompletion::new(|prompt| {
        let n = article_count(prompt);
        if n > 2 {
            Err(RelcheckError::ContextLengthExceeded(format!("{n} articles")))
        } else {
            Ok(format!("[{n}]"))
        }
    });
    let store = MemoryStore::with_format_prompt();

    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(5), CheckerConfig::default())
        .await
        .unwrap();

    // fold 1: [5] fails; fold 2: [2] ok, [3] fails; fold 3: [1] [2] [2]
    let sizes: Vec<usize> = completion.summary_prompts().iter().map(|p| article_count(p)).collect();
    assert_eq!(sizes, vec![5, 2, 3, 1, 2, 2]);

    // Partial results of failed attempts are discarded
    assert_eq!(checker.summary(), "[1][2][2]");
}

#[tokio::test]
async fn fold_labels_keep_seed_positions() {
    let completion = ScriptedCompletion::new(|prompt| {
        if article_count(prompt) > 1 {
            Err(RelcheckError::ContextLengthExceeded("too long".to_string()))
        } else {
            Ok("x".to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();

    RelevanceChecker::new(completion.clone(), &store, seeds(2), CheckerConfig::default())
        .await
        .unwrap();

    let prompts = completion.summary_prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].ends_with(" Article 0: seed text 0"));
    assert!(prompts[2].ends_with(" Article 1: seed text 1"));
}

#[tokio::test]
async fn single_article_too_large_fails_with_distinct_error() {
    let completion = ScriptedCompletion::new(|_| Err(RelcheckError::ContextLengthExceeded("too long".to_string())));
    let store = MemoryStore::with_format_prompt();

    let err = RelevanceChecker::new(completion.clone(), &store, seeds(3), CheckerConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelcheckError::SummaryTooLarge { seeds: 3 }), "got {err:?}");

    // One failing request per fold count 1, 2, 3
    assert_eq!(completion.summary_prompts().len(), 3);
}

#[tokio::test]
async fn other_summary_errors_are_not_retried() {
    let completion = ScriptedCompletion::new(|_| {
        Err(RelcheckError::Api {
            code: 401,
            message: "Incorrect API key provided".to_string(),
        })
    });
    let store = MemoryStore::with_format_prompt();

    let err = RelevanceChecker::new(completion.clone(), &store, seeds(4), CheckerConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelcheckError::Api { code: 401, .. }));
    assert_eq!(completion.prompts().len(), 1);
}

#[tokio::test]
async fn oversized_candidate_is_not_split() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok("theme".to_string())
        } else {
            Err(RelcheckError::ContextLengthExceeded("candidate too long".to_string()))
        }
    });
    let store = MemoryStore::with_format_prompt();
    let checker = RelevanceChecker::new(completion.clone(), &store, seeds(2), CheckerConfig::default())
        .await
        .unwrap();

    let err = checker
        .check_relevancy(&[Article::new("u1", "very long"), Article::new("u2", "short")])
        .await
        .unwrap_err();
    assert!(err.is_context_length_exceeded());
    assert_eq!(completion.prompts().iter().filter(|p| !is_summary(p)).count(), 1);
}

#[tokio::test]
async fn empty_seed_set_is_rejected() {
    let completion = ScriptedCompletion::new(|_| Ok("theme".to_string()));
    let store = MemoryStore::with_format_prompt();

    let err = RelevanceChecker::new(completion.clone(), &store, Vec::new(), CheckerConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelcheckError::Validation(_)));

    let config = CheckerConfig {
        seed_capacity: 0,
        ..CheckerConfig::default()
    };
    let err = RelevanceChecker::new(completion.clone(), &store, seeds(3), config)
        .await
        .unwrap_err();
    assert!(matches!(err, RelcheckError::Validation(_)));

    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn missing_template_fails_before_any_model_call() {
    let completion = ScriptedCompletion::new(|_| Ok("theme".to_string()));
    let store = MemoryStore::default();
    let config = CheckerConfig {
        format_prompt_location: StorageLocation::new("bucket", "nope.txt"),
        ..CheckerConfig::default()
    };

    let err = RelevanceChecker::new(completion.clone(), &store, seeds(2), config)
        .await
        .unwrap_err();
    match err {
        RelcheckError::NotFound { bucket, key } => {
            assert_eq!(bucket, "bucket");
            assert_eq!(key, "nope.txt");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn concurrent_requests_keep_input_order() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            return Ok("theme".to_string());
        }
        let text = prompt.rsplit("Candidate article: ").next().unwrap_or_default();
        Ok(format!(r#"{{"text": "{text}"}}"#))
    });
    let store = MemoryStore::with_format_prompt();
    let config = CheckerConfig {
        max_concurrent_requests: 4,
        ..CheckerConfig::default()
    };
    let checker = RelevanceChecker::new(completion, &store, seeds(1), config).await.unwrap();

    // The slow first candidate finishes last but must still come first
    let candidates = vec![
        Article::new("u1", "slow one"),
        Article::new("u2", "fast two"),
        Article::new("u3", "fast three"),
    ];
    let results = checker.check_relevancy(&candidates).await.unwrap();

    let urls: Vec<&str> = results.iter().filter_map(|r| r.get("url")?.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2", "u3"]);
    assert_eq!(results[0].get("text"), Some(&json!("slow one")));
}

#[tokio::test]
async fn relevancy_batch_runs_on_spawned_task() {
    let completion = ScriptedCompletion::new(|prompt| {
        if is_summary(prompt) {
            Ok("theme".to_string())
        } else {
            Ok(r#"{"relevant": false}"#.to_string())
        }
    });
    let store = MemoryStore::with_format_prompt();
    let config = CheckerConfig {
        max_concurrent_requests: 2,
        ..CheckerConfig::default()
    };
    let checker = Arc::new(
        RelevanceChecker::new(completion, &store, seeds(2), config)
            .await
            .unwrap(),
    );

    let candidates = vec![Article::new("u1", "A"), Article::new("u2", "B")];
    let task = {
        let checker = Arc::clone(&checker);
        tokio::spawn(async move { checker.check_relevancy(&candidates).await })
    };

    let results = task.await.unwrap().unwrap();
    let urls: Vec<&str> = results.iter().filter_map(|r| r.get("url")?.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2"]);
}
