//! Users, datasets and annotations of the hosted annotation store

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::debug;
use uuid::Uuid;

use crate::connection::{DatabaseError, DbSessionMaker};
use crate::entities::{annotations, datasets, users, Annotation, Annotations, Dataset, Datasets, User, Users};

#[derive(Clone)]
pub struct AnnotationRepository {
    sessions: DbSessionMaker,
}

impl AnnotationRepository {
    pub fn new(sessions: DbSessionMaker) -> Self {
        Self { sessions }
    }

    pub async fn create_user(&self, id: &str) -> Result<User, DatabaseError> {
        let now = Utc::now();
        let user = users::ActiveModel {
            id: Set(id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let user = user.insert(self.sessions.session()).await?;
        debug!("Created user {}", user.id);
        Ok(user)
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        Ok(Users::find_by_id(id).one(self.sessions.session()).await?)
    }

    pub async fn create_dataset(&self, id: &str, name: Option<&str>) -> Result<Dataset, DatabaseError> {
        let dataset = datasets::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.map(str::to_string)),
            created_at: Set(Utc::now()),
        };
        let dataset = dataset.insert(self.sessions.session()).await?;
        debug!("Created dataset {}", dataset.id);
        Ok(dataset)
    }

    pub async fn find_dataset(&self, id: &str) -> Result<Option<Dataset>, DatabaseError> {
        Ok(Datasets::find_by_id(id).one(self.sessions.session()).await?)
    }

    /// Record a new annotation array for a user and dataset; both must exist
    pub async fn create_annotation(
        &self,
        user_id: &str,
        dataset_id: &str,
        tiledb_uri: Option<&str>,
    ) -> Result<Annotation, DatabaseError> {
        if self.find_user(user_id).await?.is_none() {
            return Err(DatabaseError::NotFound(format!("user '{}'", user_id)));
        }
        if self.find_dataset(dataset_id).await?.is_none() {
            return Err(DatabaseError::NotFound(format!("dataset '{}'", dataset_id)));
        }

        let annotation = annotations::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            tiledb_uri: Set(tiledb_uri.map(str::to_string)),
            user_id: Set(user_id.to_string()),
            dataset_id: Set(dataset_id.to_string()),
            created_at: Set(Utc::now()),
        };
        let annotation = annotation.insert(self.sessions.session()).await?;
        debug!(
            "Created annotation {} for user {} on dataset {}",
            annotation.id, user_id, dataset_id
        );
        Ok(annotation)
    }

    /// Annotations of a user for a dataset, newest first
    pub async fn annotations_for(&self, user_id: &str, dataset_id: &str) -> Result<Vec<Annotation>, DatabaseError> {
        let annotations = Annotations::find()
            .filter(annotations::Column::UserId.eq(user_id))
            .filter(annotations::Column::DatasetId.eq(dataset_id))
            .order_by_desc(annotations::Column::CreatedAt)
            .all(self.sessions.session())
            .await?;
        Ok(annotations)
    }

    /// The default annotation of a user for a dataset: the most recently created one
    pub async fn latest_annotation(&self, user_id: &str, dataset_id: &str) -> Result<Option<Annotation>, DatabaseError> {
        let annotation = Annotations::find()
            .filter(annotations::Column::UserId.eq(user_id))
            .filter(annotations::Column::DatasetId.eq(dataset_id))
            .order_by_desc(annotations::Column::CreatedAt)
            .one(self.sessions.session())
            .await?;
        Ok(annotation)
    }
}
