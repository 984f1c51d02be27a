use std::collections::HashMap;
use std::marker::PhantomData;

use sea_orm::sea_query::{Expr, Query, SelectStatement, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityName, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::{debug, error};

use crate::config::NestedSetConfig;
use crate::error::NestedSetError;
use crate::invariant::{self, NodeBounds, Violation};
use crate::lock::{self, LockedTransaction};
use crate::traits::NestedSetModel;
use crate::tree::{self, TreeNode};

/// Repository exposing the nested-set operations for a given model.
///
/// Mutations take any handle that can open a transaction. A `DatabaseConnection` gets a fresh
/// transaction per call; a `DatabaseTransaction` gets a savepoint, and the table lock is then
/// held until the caller's outer transaction ends.
#[derive(Debug)]
pub struct NestedSetRepository<M>
where
    M: NestedSetModel,
{
    _marker: PhantomData<M>,
}

impl<M> Default for NestedSetRepository<M>
where
    M: NestedSetModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> NestedSetRepository<M>
where
    M: NestedSetModel,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn config(&self) -> &'static NestedSetConfig {
        M::nested_set_config()
    }

    fn entity(&self) -> &'static str {
        self.config().entity_name()
    }

    fn ensure_supported(conn: &impl ConnectionTrait) -> Result<(), NestedSetError> {
        lock::ensure_supported(conn.get_database_backend())
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<M, NestedSetError> {
        Self::ensure_supported(conn)?;
        self.find_on(conn, id).await
    }

    pub async fn parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let condition = Condition::any()
            .add(M::id_column().eq(M::id_to_value(id)))
            .add(Expr::col(M::id_column()).in_subquery(Self::lookup(M::parent_column(), id)));
        let mut rows = self.with_node(conn, id, condition).await?;
        let node = self.take_node(&mut rows, id)?;
        match node.parent_id() {
            Some(parent_id) => rows
                .into_iter()
                .find(|row| row.id() == parent_id)
                .map(Some)
                .ok_or_else(|| NestedSetError::not_found(self.entity(), &parent_id)),
            None => Ok(None),
        }
    }

    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let rows = M::Entity::find()
            .filter(M::parent_column().is_null())
            .order_by_asc(M::left_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Direct children, in sibling order. An unknown id simply has no children.
    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let rows = M::Entity::find()
            .filter(M::parent_column().eq(M::id_to_value(id)))
            .order_by_asc(M::left_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Nodes sharing the parent of `id` (or all other roots), excluding `id` itself.
    pub async fn siblings<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let root_lookup = Query::select()
            .column(M::id_column())
            .from(M::Entity::default().table_ref())
            .and_where(Expr::col(M::id_column()).eq(M::id_to_value(id)))
            .and_where(Expr::col(M::parent_column()).is_null())
            .to_owned();
        let condition = Condition::any()
            .add(M::id_column().eq(M::id_to_value(id)))
            .add(Expr::col(M::parent_column()).in_subquery(Self::lookup(M::parent_column(), id)))
            .add(
                Condition::all()
                    .add(M::parent_column().is_null())
                    .add(Expr::exists(root_lookup)),
            );
        let mut rows = self.with_node(conn, id, condition).await?;
        self.take_node(&mut rows, id)?;
        Ok(rows)
    }

    pub async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, NestedSetError> {
        let mut rows = self.self_and_descendants(conn, id).await?;
        rows.remove(0);
        Ok(rows)
    }

    /// `id` followed by its descendants in preorder.
    pub async fn self_and_descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let condition = Condition::all()
            .add(Expr::col(M::left_column()).gte(Self::bound_of(M::left_column(), id)))
            .add(Expr::col(M::right_column()).lte(Self::bound_of(M::right_column(), id)));
        let mut rows = self.with_node(conn, id, condition).await?;
        let node = self.take_node(&mut rows, id)?;
        rows.insert(0, node);
        Ok(rows)
    }

    /// Enclosing nodes, root first.
    pub async fn ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let condition = Condition::all()
            .add(Expr::col(M::left_column()).lte(Self::bound_of(M::left_column(), id)))
            .add(Expr::col(M::right_column()).gte(Self::bound_of(M::right_column(), id)));
        let mut rows = self.with_node(conn, id, condition).await?;
        self.take_node(&mut rows, id)?;
        Ok(rows)
    }

    /// Descendants of `id` nested under their parents; the top level holds its children.
    pub async fn descendant_tree<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<TreeNode<M>>, NestedSetError> {
        let rows = self.descendants(conn, id).await?;
        Ok(tree::build_forest(rows))
    }

    /// The whole table nested under its roots.
    pub async fn forest<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<TreeNode<M>>, NestedSetError> {
        Self::ensure_supported(conn)?;
        let rows = M::Entity::find()
            .order_by_asc(M::left_column())
            .all(conn)
            .await?;
        Ok(tree::build_forest(rows))
    }

    pub async fn is_descendant_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        ancestor_id: &M::Id,
    ) -> Result<bool, NestedSetError> {
        Self::ensure_supported(conn)?;
        let mut rows = M::Entity::find()
            .filter(M::id_column().is_in([M::id_to_value(id), M::id_to_value(ancestor_id)]))
            .all(conn)
            .await?;
        let node = self.take_node(&mut rows, id)?;
        let ancestor = match rows.into_iter().find(|row| row.id() == *ancestor_id) {
            Some(ancestor) => ancestor,
            None if id == ancestor_id => node.clone(),
            None => return Err(NestedSetError::not_found(self.entity(), ancestor_id)),
        };
        Ok(ancestor.contains(&node))
    }

    /// Run every structural check over the table and report what is broken.
    pub async fn verify<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<Violation<M::Id>>, NestedSetError> {
        Self::ensure_supported(conn)?;
        self.verify_on(conn).await
    }

    /// Insert `payload` as the last child of `parent_id`, or as the last root.
    pub async fn insert<C>(
        &self,
        db: &C,
        payload: M::ActiveModel,
        parent_id: Option<&M::Id>,
    ) -> Result<M, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = LockedTransaction::acquire(self.config(), db).await?;
        let result = self.insert_on(guard.connection(), payload, parent_id).await;
        guard.finish(result).await
    }

    /// Relocate `id` with its whole subtree to become the last child of `new_parent_id`, or
    /// the last root.
    ///
    /// The subtree is parked on negated bounds, the hole it leaves is closed, a gap of the
    /// same width is opened at the destination and the parked rows are shifted into it.
    pub async fn move_to<C>(
        &self,
        db: &C,
        id: &M::Id,
        new_parent_id: Option<&M::Id>,
    ) -> Result<M, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = LockedTransaction::acquire(self.config(), db).await?;
        let result = self.move_on(guard.connection(), id, new_parent_id).await;
        guard.finish(result).await
    }

    /// Delete `id` and every descendant. Returns the number of removed rows.
    pub async fn delete<C>(&self, db: &C, id: &M::Id) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = LockedTransaction::acquire(self.config(), db).await?;
        let result = self.delete_on(guard.connection(), id).await;
        guard.finish(result).await
    }

    /// Recompute all bounds and depths from `parent_id` links, keeping sibling order.
    pub async fn rebuild<C>(&self, db: &C) -> Result<(), NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = LockedTransaction::acquire(self.config(), db).await?;
        let result = self.rebuild_on(guard.connection()).await;
        guard.finish(result).await
    }

    /// `SELECT <column> FROM <table> WHERE <id> = id`.
    fn lookup(column: <M::Entity as EntityTrait>::Column, id: &M::Id) -> SelectStatement {
        Query::select()
            .column(column)
            .from(M::Entity::default().table_ref())
            .and_where(Expr::col(M::id_column()).eq(M::id_to_value(id)))
            .to_owned()
    }

    /// One bound of `id` as a scalar subquery, so a read resolves the node in the same
    /// statement that scans its range and never mixes two committed states.
    fn bound_of(column: <M::Entity as EntityTrait>::Column, id: &M::Id) -> SimpleExpr {
        SimpleExpr::SubQuery(
            None,
            Box::new(Self::lookup(column, id).into_sub_query_statement()),
        )
    }

    /// Single-statement read whose `condition` also matches the row `id` itself.
    async fn with_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        condition: Condition,
    ) -> Result<Vec<M>, NestedSetError> {
        let rows = M::Entity::find()
            .filter(condition)
            .order_by_asc(M::left_column())
            .all(conn)
            .await?;
        if rows.is_empty() {
            return Err(NestedSetError::not_found(self.entity(), id));
        }
        Ok(rows)
    }

    /// Remove the row `id` from `rows` and return it.
    fn take_node(&self, rows: &mut Vec<M>, id: &M::Id) -> Result<M, NestedSetError> {
        rows.iter()
            .position(|row| row.id() == *id)
            .map(|index| rows.remove(index))
            .ok_or_else(|| NestedSetError::not_found(self.entity(), id))
    }

    async fn find_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<M, NestedSetError> {
        M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await?
            .ok_or_else(|| NestedSetError::not_found(self.entity(), id))
    }

    async fn verify_on<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<Violation<M::Id>>, NestedSetError> {
        let rows = M::Entity::find()
            .order_by_asc(M::left_column())
            .all(conn)
            .await?;
        let bounds: Vec<NodeBounds<M::Id>> = rows.iter().map(NodeBounds::of).collect();
        Ok(invariant::check(&bounds))
    }

    async fn verify_after_write<C: ConnectionTrait>(&self, conn: &C) -> Result<(), NestedSetError> {
        if !self.config().verify_writes() {
            return Ok(());
        }

        let violations = self.verify_on(conn).await?;
        if violations.is_empty() {
            return Ok(());
        }

        let detail = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        error!(
            entity = self.entity(),
            table = self.config().table_name(),
            violations = violations.len(),
            %detail,
            "nested-set invariants broken, rolling back"
        );
        Err(NestedSetError::invariant(detail))
    }

    /// Highest live `right` bound; parked (negated) rows are ignored.
    async fn max_right<C: ConnectionTrait>(&self, conn: &C) -> Result<i32, NestedSetError> {
        let max: Option<i32> = M::Entity::find()
            .select_only()
            .column_as(M::right_column().max(), "max_right")
            .filter(M::right_column().gt(0))
            .into_tuple::<Option<i32>>()
            .one(conn)
            .await?
            .flatten();
        Ok(max.unwrap_or(0))
    }

    /// Where a new last child of `parent_id` (or new last root) starts, and its depth.
    async fn insertion_point<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<&M::Id>,
    ) -> Result<(i32, i32), NestedSetError> {
        match parent_id {
            Some(parent_id) => {
                let parent = self.find_on(conn, parent_id).await?;
                Ok((parent.right(), parent.depth() + 1))
            }
            None => Ok((self.max_right(conn).await? + 1, 0)),
        }
    }

    /// Shift every live bound at or after `point` up by `width`.
    async fn open_gap<C: ConnectionTrait>(
        &self,
        conn: &C,
        point: i32,
        width: i32,
    ) -> Result<(), NestedSetError> {
        M::Entity::update_many()
            .col_expr(M::right_column(), Expr::col(M::right_column()).add(width))
            .filter(M::right_column().gte(point))
            .exec(conn)
            .await?;
        M::Entity::update_many()
            .col_expr(M::left_column(), Expr::col(M::left_column()).add(width))
            .filter(M::left_column().gte(point))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Shift every bound after `after` down by `width`.
    async fn close_gap<C: ConnectionTrait>(
        &self,
        conn: &C,
        after: i32,
        width: i32,
    ) -> Result<(), NestedSetError> {
        M::Entity::update_many()
            .col_expr(M::left_column(), Expr::col(M::left_column()).sub(width))
            .filter(M::left_column().gt(after))
            .exec(conn)
            .await?;
        M::Entity::update_many()
            .col_expr(M::right_column(), Expr::col(M::right_column()).sub(width))
            .filter(M::right_column().gt(after))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn insert_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payload: M::ActiveModel,
        parent_id: Option<&M::Id>,
    ) -> Result<M, NestedSetError> {
        let (point, depth) = self.insertion_point(conn, parent_id).await?;
        self.open_gap(conn, point, 2).await?;

        let mut active = payload;
        M::set_parent(&mut active, parent_id.cloned());
        M::set_bounds(&mut active, point, point + 1, depth);
        let model = active.insert(conn).await?;

        debug!(
            entity = self.entity(),
            id = ?model.id(),
            parent = ?parent_id,
            left = point,
            depth,
            "inserted node"
        );

        self.verify_after_write(conn).await?;
        Ok(model)
    }

    async fn move_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        new_parent_id: Option<&M::Id>,
    ) -> Result<M, NestedSetError> {
        let node = self.find_on(conn, id).await?;
        if let Some(parent_id) = new_parent_id {
            let parent = self.find_on(conn, parent_id).await?;
            if parent.left() >= node.left() && parent.left() <= node.right() {
                return Err(NestedSetError::invalid(format!(
                    "cannot move {} {id:?} under {parent_id:?}, which is inside its own subtree",
                    self.entity()
                )));
            }
        }

        if node.parent_id().as_ref() == new_parent_id {
            debug!(entity = self.entity(), id = ?id, "node already under requested parent");
            return Ok(node);
        }

        let (left, right) = (node.left(), node.right());
        let width = right - left + 1;

        M::Entity::update_many()
            .col_expr(M::left_column(), Expr::col(M::left_column()).mul(-1))
            .col_expr(M::right_column(), Expr::col(M::right_column()).mul(-1))
            .filter(M::left_column().gte(left))
            .filter(M::right_column().lte(right))
            .exec(conn)
            .await?;
        self.close_gap(conn, right, width).await?;

        let (point, depth) = self.insertion_point(conn, new_parent_id).await?;
        self.open_gap(conn, point, width).await?;

        // Parked rows hold -bound, so `offset - parked` restores them shifted into the gap.
        let offset = point - left;
        M::Entity::update_many()
            .col_expr(
                M::left_column(),
                Expr::val(offset).sub(Expr::col(M::left_column())),
            )
            .col_expr(
                M::right_column(),
                Expr::val(offset).sub(Expr::col(M::right_column())),
            )
            .col_expr(
                M::depth_column(),
                Expr::col(M::depth_column()).add(depth - node.depth()),
            )
            .filter(M::left_column().lt(0))
            .exec(conn)
            .await?;

        let moved = self.find_on(conn, id).await?;
        let mut active = moved.into_active_model();
        M::set_parent(&mut active, new_parent_id.cloned());
        let moved = active.update(conn).await?;

        debug!(
            entity = self.entity(),
            id = ?id,
            parent = ?new_parent_id,
            from = left,
            to = moved.left(),
            width,
            depth,
            "moved subtree"
        );

        self.verify_after_write(conn).await?;
        Ok(moved)
    }

    async fn delete_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let node = self.find_on(conn, id).await?;
        let (left, right) = (node.left(), node.right());
        let width = right - left + 1;

        // Counted from the range; an `ON DELETE CASCADE` parent key makes `rows_affected` undercount.
        let deleted = (width / 2) as u64;
        M::Entity::delete_many()
            .filter(M::left_column().gte(left))
            .filter(M::right_column().lte(right))
            .exec(conn)
            .await?;
        self.close_gap(conn, right, width).await?;

        debug!(
            entity = self.entity(),
            id = ?id,
            left,
            right,
            deleted,
            "deleted subtree"
        );

        self.verify_after_write(conn).await?;
        Ok(deleted)
    }

    async fn rebuild_on<C: ConnectionTrait>(&self, conn: &C) -> Result<(), NestedSetError> {
        let rows = M::Entity::find()
            .order_by_asc(M::left_column())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;

        let links: Vec<(M::Id, Option<M::Id>)> =
            rows.iter().map(|row| (row.id(), row.parent_id())).collect();
        let (bounds, unreachable) = tree::renumber(&links);
        if !unreachable.is_empty() {
            return Err(NestedSetError::invariant(format!(
                "{} {} rows are not reachable from a root: {unreachable:?}",
                unreachable.len(),
                self.entity()
            )));
        }

        let mut by_id: HashMap<M::Id, M> = rows.into_iter().map(|row| (row.id(), row)).collect();
        let mut updated = 0usize;
        for bound in bounds {
            let Some(model) = by_id.remove(&bound.id) else {
                continue;
            };
            if model.left() == bound.left
                && model.right() == bound.right
                && model.depth() == bound.depth
            {
                continue;
            }
            let mut active = model.into_active_model();
            M::set_bounds(&mut active, bound.left, bound.right, bound.depth);
            active.update(conn).await?;
            updated += 1;
        }

        debug!(entity = self.entity(), updated, "rebuilt nested set");

        self.verify_after_write(conn).await?;
        Ok(())
    }
}
