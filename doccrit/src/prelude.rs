//! Convenient re-exports of commonly used types from doccrit.
//!
//! ```ignore
//! use doccrit::prelude::*;
//! ```
//!
//! This provides access to:
//! - The derive macros and the property traits they implement
//! - Criteria, queries, updates and aggregations
//! - The operations traits, builders and result types
//! - Error types

pub use doccrit_core::{
    aggregation::{Accumulator, Aggregation, Group, Stage},
    criteria::{BsonType, Criteria, FieldCriteria},
    entity::{Entity, EntityExt},
    error::{CriteriaError, CriteriaResult, OperationsError, OperationsResult},
    extensions::{IndexOperations, MongoOperationsExt},
    find::ExecutableFind,
    geo::{Circle, Distance, GeoJson, Metric, Point, Shape},
    index::{Index, IndexInfo, IndexKind},
    map_reduce::{MapReduceOptions, MapReduceOutput},
    near::{GeoResult, GeoResults, NearQuery},
    operations::{
        DeleteResult, FindAndModifyOptions, MongoOperations, OperationsBuilder, UpdateOptions,
        UpdateResult,
    },
    page::{Page, PaginationParams},
    property::{Embedded, HasFields, Property},
    query::{Direction, Query, QueryBuilder, Sort},
    update::{Position, Update},
};
pub use doccrit_macros::{Entity, Fields};
