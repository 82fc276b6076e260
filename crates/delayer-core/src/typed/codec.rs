//! PayloadCodec - TaskKind と `Task.parameters` の相互変換（JSON bytes）

use chrono::{DateTime, Utc};

use super::task::TaskKind;
use crate::domain::{CodecError, NewTask};

pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: TaskKind>(payload: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(CodecError::Encode)
    }

    pub fn decode<T: TaskKind>(bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    /// Builds a [`NewTask`] in `T`'s bucket.
    pub fn new_task<T: TaskKind>(payload: &T, at: DateTime<Utc>) -> Result<NewTask, CodecError> {
        Ok(NewTask::new(T::bucket(), at, Self::encode(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::task::fixtures::{ArticleReview, CacheWarmup};

    #[test]
    fn new_task_lands_in_the_kind_bucket() {
        let review = ArticleReview {
            article_id: 42,
            reviewer: "kei".into(),
        };
        let task = PayloadCodec::new_task(&review, Utc::now()).unwrap();

        assert_eq!(task.bucket(), ArticleReview::bucket());
        assert_eq!(
            PayloadCodec::decode::<ArticleReview>(&task.parameters).unwrap(),
            review
        );
    }

    #[test]
    fn decoding_into_the_wrong_kind_fails() {
        let bytes = PayloadCodec::encode(&CacheWarmup {
            keys: vec!["home".into()],
        })
        .unwrap();
        assert!(matches!(
            PayloadCodec::decode::<ArticleReview>(&bytes),
            Err(CodecError::Decode(_))
        ));
    }
}
