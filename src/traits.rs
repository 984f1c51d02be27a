use std::fmt::Debug;
use std::hash::Hash;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel, Value,
};

use crate::config::NestedSetConfig;

/// Trait implemented by SeaORM `Model` types stored as a nested set.
///
/// Implementations are normally provided by the `#[derive(NestedSetModel)]` macro. The row
/// carries `parent_id`, `left`, `right` and `depth`; everything else is payload the engine
/// never looks at.
pub trait NestedSetModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn nested_set_config() -> &'static NestedSetConfig;

    fn id(&self) -> Self::Id;
    fn parent_id(&self) -> Option<Self::Id>;
    fn left(&self) -> i32;
    fn right(&self) -> i32;
    fn depth(&self) -> i32;

    fn set_parent(active: &mut Self::ActiveModel, parent: Option<Self::Id>);
    fn set_bounds(active: &mut Self::ActiveModel, left: i32, right: i32, depth: i32);
    fn id_to_value(id: &Self::Id) -> Value;

    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn parent_column() -> <Self::Entity as EntityTrait>::Column;
    fn left_column() -> <Self::Entity as EntityTrait>::Column;
    fn right_column() -> <Self::Entity as EntityTrait>::Column;
    fn depth_column() -> <Self::Entity as EntityTrait>::Column;

    /// Number of strict descendants encoded by the range width.
    fn descendant_count(&self) -> i32 {
        (self.right() - self.left() - 1) / 2
    }

    fn is_leaf(&self) -> bool {
        self.right() - self.left() == 1
    }

    fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    /// True when `other` lies strictly inside this node's range.
    fn contains(&self, other: &Self) -> bool {
        self.left() < other.left() && other.right() < self.right()
    }
}
