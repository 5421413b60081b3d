pub mod annotations;
pub mod datasets;
pub mod users;

pub use annotations::{
    ActiveModel as AnnotationActiveModel, Column as AnnotationColumn, Entity as Annotations, Model as Annotation,
};
pub use datasets::{ActiveModel as DatasetActiveModel, Column as DatasetColumn, Entity as Datasets, Model as Dataset};
pub use users::{ActiveModel as UserActiveModel, Column as UserColumn, Entity as Users, Model as User};
