use bson::{Bson, doc};
use doccrit::prelude::*;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields, Entity)]
#[entity(collection = "books")]
struct Book {
    #[serde(rename = "_id")]
    id: i32,
    title: String,
    #[doccrit(rename = "published")]
    #[serde(rename = "published")]
    year: i32,
    author: Author,
    reviews: Vec<Review>,
    #[serde(skip)]
    cached_rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields)]
struct Author {
    name: String,
    #[serde(rename = "born_in")]
    birthplace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields)]
struct Review {
    stars: i32,
}

#[derive(Debug, Serialize, Deserialize, Fields, Entity)]
struct ReadingList {
    name: String,
}

#[test]
fn accessors_use_stored_field_names() {
    assert_eq!(BookFields::id().path(), "_id");
    assert_eq!(BookFields::title().path(), "title");
    assert_eq!(BookFields::year().path(), "published");
    assert_eq!(AuthorFields::birthplace().path(), "born_in");
}

#[test]
fn nested_properties_compose_paths() {
    assert_eq!(
        (BookFields::author() / AuthorFields::birthplace()).path(),
        "author.born_in"
    );
    assert_eq!((BookFields::reviews() / ReviewFields::stars()).path(), "reviews.stars");
}

#[test]
fn entity_collection_names() {
    assert_eq!(Book::collection_name(), "books");
    assert_eq!(ReadingList::collection_name(), "readingList");
}

#[test]
fn derived_properties_render_criteria() {
    let query = Query::new(
        (BookFields::author() / AuthorFields::name())
            .eq("Frank Herbert")
            .and(BookFields::year().gte(1960).lt(1970))
            .and(BookFields::reviews().elem_match(ReviewFields::stars().gte(4))),
    );

    assert_eq!(
        query.filter_document().unwrap(),
        doc! {
            "author.name": "Frank Herbert",
            "published": { "$gte": 1960, "$lt": 1970 },
            "reviews": { "$elemMatch": { "stars": { "$gte": 4 } } },
        }
    );
}

#[test]
fn optional_nested_fields_accept_null() {
    let criteria = (BookFields::author() / AuthorFields::birthplace()).eq(None::<String>);
    assert_eq!(
        criteria.to_document().unwrap(),
        doc! { "author.born_in": Bson::Null }
    );
}

#[test]
fn derived_properties_render_updates() {
    let update = Update::new()
        .set(BookFields::title(), "Dune")
        .inc(BookFields::year(), 1)
        .push(BookFields::reviews(), Review { stars: 5 });

    assert_eq!(
        update.to_document().unwrap(),
        doc! {
            "$set": { "title": "Dune" },
            "$inc": { "published": 1 },
            "$push": { "reviews": { "stars": 5 } },
        }
    );
}

#[test]
fn malformed_criteria_fail_when_rendered() {
    let query = Query::new(BookFields::title().not().eq("Dune"));
    assert!(matches!(
        query.filter_document(),
        Err(CriteriaError::InvalidApiUsage(_))
    ));
}
