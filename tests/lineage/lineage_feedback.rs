//! Feedback validation, engine failures and correction explanations.

use alias_lineage::{
    ChatMessage, ChatRequest, EngineError, Error, Feedback, FeedbackRequest, LineageStore,
    RejectReason, Role, StoreError,
};

use crate::fixture::{service_with, test_config, ScriptedEngine, FINANCE_ALIAS};

#[tokio::test]
async fn test_correction_without_text_is_rejected_before_training() {
    let engine = ScriptedEngine::new();
    let (store, service) = service_with(&engine, &test_config());
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();

    let mut feedback = Feedback::corrected("q", "x");
    feedback.correct_output = None;

    let err = service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, feedback))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FeedbackRejected(RejectReason::MissingCorrection)));
    assert!(err.model_unchanged());
    assert!(engine.trainings().is_empty());
    assert_eq!(store.get(FINANCE_ALIAS).await.unwrap().unwrap().version, 0);
}

#[tokio::test]
async fn test_feedback_for_unknown_alias_is_rejected() {
    let engine = ScriptedEngine::new();
    let (store, service) = service_with(&engine, &test_config());

    let err = service
        .submit_feedback(FeedbackRequest::new("never-used", Feedback::approved("q", "a")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::FeedbackRejected(RejectReason::UnknownAlias(ref alias)) if alias == "never-used"
    ));
    assert!(engine.trainings().is_empty());
    assert!(store.aliases().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_alias_is_rejected() {
    let engine = ScriptedEngine::new();
    let (_store, service) = service_with(&engine, &test_config());

    assert!(matches!(
        service.resolve_for_inference("   ").await,
        Err(Error::EmptyAlias)
    ));
    assert!(matches!(
        service
            .submit_feedback(FeedbackRequest::new("", Feedback::approved("q", "a")))
            .await,
        Err(Error::EmptyAlias)
    ));
}

#[tokio::test]
async fn test_training_failure_leaves_lineage_untouched() {
    let engine = ScriptedEngine::new();
    engine.fail_training(true);
    let (store, service) = service_with(&engine, &test_config());
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();

    let err = service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("q", "a")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::TrainingFailed(_))));
    assert!(err.model_unchanged());
    assert!(err.to_string().contains("loss diverged"));

    let record = store.get(FINANCE_ALIAS).await.unwrap().unwrap();
    assert!(record.is_pristine());
    assert_eq!(record.version, 0);
}

#[tokio::test]
async fn test_stale_expected_version_skips_training() {
    let engine = ScriptedEngine::new();
    let (_store, service) = service_with(&engine, &test_config());
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();
    service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("q", "a")))
        .await
        .unwrap();

    let mut request = FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("q", "b"));
    request.expected_version = Some(0);
    let err = service.submit_feedback(request).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Store(StoreError::VersionConflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));
    assert!(err.model_unchanged());
    assert_eq!(engine.trainings().len(), 1);
}

#[tokio::test]
async fn test_served_tokens_reach_training() {
    let engine = ScriptedEngine::new();
    let (_store, service) = service_with(&engine, &test_config());
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();

    service
        .submit_feedback(FeedbackRequest::new(
            FINANCE_ALIAS,
            Feedback::approved("q", "a").with_sample(vec![11, 12], vec![-0.4, -0.6]),
        ))
        .await
        .unwrap();
    service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::corrected("q", "b")))
        .await
        .unwrap();

    let trainings = engine.trainings();
    let sample = trainings[0].sampled.as_ref().unwrap();
    assert_eq!(sample.tokens, vec![11, 12]);
    assert_eq!(sample.logprobs, vec![-0.4, -0.6]);
    assert_eq!(sample.advantage, 1.0);
    assert!(trainings[1].sampled.is_none());
}

#[tokio::test]
async fn test_request_system_prompt_reaches_training() {
    let engine = ScriptedEngine::new();
    let (_store, service) = service_with(&engine, &test_config());
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();

    let mut request = FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("q", "a"));
    request.system_prompt = Some("You are a finance analyst.".into());
    service.submit_feedback(request).await.unwrap();
    service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("q", "a")))
        .await
        .unwrap();

    let trainings = engine.trainings();
    assert_eq!(trainings[0].system_prompt, "You are a finance analyst.");
    assert_eq!(trainings[1].system_prompt, "You are a helpful assistant.");
}

#[tokio::test]
async fn test_corrections_explained_by_base_model() {
    let engine = ScriptedEngine::new();
    let mut config = test_config();
    config.feedback.explain_corrections = true;
    let (_store, service) = service_with(&engine, &config);
    service.resolve_for_inference(FINANCE_ALIAS).await.unwrap();

    service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::corrected("2+2?", "4")))
        .await
        .unwrap();

    let inferences = engine.inferences();
    assert_eq!(inferences.len(), 1);
    assert_eq!(inferences[0].weights, "org/base-model");
    assert_eq!(inferences[0].params.max_tokens, 1024);
    assert!(inferences[0].user_prompt.contains("The correct answer is: 4"));

    let trainings = engine.trainings();
    assert_eq!(trainings[0].completion, "Step 1: add the numbers.\n\nAnswer: 4");

    service
        .submit_feedback(FeedbackRequest::new(FINANCE_ALIAS, Feedback::approved("2+2?", "4")))
        .await
        .unwrap();
    assert_eq!(engine.inferences().len(), 1);
    assert_eq!(engine.trainings()[1].completion, "4");
}

#[tokio::test]
async fn test_chat_validation_happens_before_resolution() {
    let engine = ScriptedEngine::new();
    let (store, service) = service_with(&engine, &test_config());

    let err = service
        .chat(ChatRequest::new(
            FINANCE_ALIAS,
            vec![ChatMessage::new(Role::Assistant, "hello")],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    let mut request = ChatRequest::new(FINANCE_ALIAS, vec![ChatMessage::new(Role::User, "hi")]);
    request.max_tokens = Some(-5);
    assert!(service.chat(request).await.is_err());

    assert!(engine.inferences().is_empty());
    assert!(store.aliases().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_forwards_prompts_and_sampling() {
    let engine = ScriptedEngine::new();
    let (_store, service) = service_with(&engine, &test_config());

    let mut request = ChatRequest::new(
        FINANCE_ALIAS,
        vec![
            ChatMessage::new(Role::System, "Answer in French."),
            ChatMessage::new(Role::User, "hello"),
        ],
    );
    request.temperature = Some(0.0);
    let reply = service.chat(request).await.unwrap();

    assert!(reply.id.starts_with("chatcmpl-"));
    assert_eq!(reply.lineage.alias, FINANCE_ALIAS);

    let inferences = engine.inferences();
    let job = &inferences[0];
    assert_eq!(job.system_prompt, "Answer in French.");
    assert_eq!(job.user_prompt, "hello");
    assert_eq!(job.params.temperature, 0.0);
    assert_eq!(job.params.max_tokens, 512);
    assert_eq!(job.base_model, "org/base-model");
}
