use std::path::PathBuf;

use quiz_core::model::{MULTIPLE_CHOICE_TAG, SINGLE_CHOICE_TAG};
use storage::assets::{AssetLoadError, JsonAssetSource, QuestionSource};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

#[tokio::test]
async fn bundled_stages_load_and_normalize() {
    let source = JsonAssetSource::new(data_dir());
    let stages = source.stages().await.expect("stages.json");
    assert_eq!(stages.len(), 6);

    for stage in stages.iter().filter(|s| !s.locked) {
        let questions = source.questions(stage).await.expect("question bank");
        assert!(!questions.is_empty(), "{} has no questions", stage.id);
        for q in &questions {
            assert!([SINGLE_CHOICE_TAG, MULTIPLE_CHOICE_TAG].contains(&q.type_tag()));
            assert_eq!(q.category(), stage.name);
        }
    }

    let ai = stages.iter().find(|s| s.id.as_str() == "ai").unwrap();
    // The ordering entry is dropped.
    assert_eq!(source.questions(ai).await.unwrap().len(), 6);
}

#[tokio::test]
async fn missing_root_is_an_io_error() {
    let source = JsonAssetSource::new(data_dir().join("nope"));
    assert!(matches!(source.stages().await, Err(AssetLoadError::Io { .. })));
}
