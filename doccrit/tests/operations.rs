use bson::Bson;
use doccrit::{memory::InMemoryOperations, prelude::*};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields, Entity)]
#[entity(collection = "books")]
struct Book {
    #[serde(rename = "_id")]
    id: i32,
    title: String,
    year: i32,
    price: f64,
    author: Author,
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stock: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields)]
struct Author {
    name: String,
}

#[derive(Debug, PartialEq, Deserialize)]
struct TitleOnly {
    title: String,
}

#[derive(Debug, PartialEq, Deserialize)]
struct AuthorCount {
    #[serde(rename = "_id")]
    author: String,
    books: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Fields, Entity)]
#[entity(collection = "venues")]
struct Venue {
    #[serde(rename = "_id")]
    id: i32,
    name: String,
    location: [f64; 2],
}

fn book(id: i32, title: &str, year: i32, price: f64, author: &str, tags: &[&str]) -> Book {
    Book {
        id,
        title: title.to_string(),
        year,
        price,
        author: Author {
            name: author.to_string(),
        },
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        stock: None,
    }
}

async fn library() -> InMemoryOperations {
    let ops = InMemoryOperations::builder().build().await.unwrap();
    ops.insert_all(&[
        book(1, "Dune", 1965, 10.0, "Frank Herbert", &["scifi", "classic"]),
        book(2, "Dune Messiah", 1969, 12.5, "Frank Herbert", &["scifi"]),
        book(3, "Emma", 1815, 4.5, "Jane Austen", &["classic", "romance"]),
        book(4, "Neuromancer", 1984, 15.0, "William Gibson", &["scifi", "cyberpunk"]),
    ])
    .await
    .unwrap();
    ops
}

fn titles(books: &[Book]) -> Vec<&str> {
    books.iter().map(|book| book.title.as_str()).collect()
}

fn by_year(direction: Direction) -> Sort {
    Sort::by(BookFields::year(), direction)
}

#[tokio::test]
async fn insert_returns_ids_in_order() {
    let ops = InMemoryOperations::new();
    let ids = ops
        .insert_all(&[
            book(7, "Emma", 1815, 4.5, "Jane Austen", &[]),
            book(8, "Persuasion", 1817, 5.0, "Jane Austen", &[]),
        ])
        .await
        .unwrap();

    assert_eq!(ids, vec![Bson::Int32(7), Bson::Int32(8)]);
    assert_eq!(
        ops.insert(&book(9, "Sanditon", 1817, 3.0, "Jane Austen", &[]))
            .await
            .unwrap(),
        Bson::Int32(9)
    );
}

#[tokio::test]
async fn find_with_nested_criteria() {
    let ops = library().await;

    let found = ops
        .find::<Book>(Query::new(
            (BookFields::author() / AuthorFields::name())
                .eq("Frank Herbert")
                .and(BookFields::year().lt(1966)),
        ))
        .await
        .unwrap();

    assert_eq!(titles(&found), vec!["Dune"]);
}

#[tokio::test]
async fn find_sorted_with_skip_and_limit() {
    let ops = library().await;

    let found = ops
        .find::<Book>(
            Query::all()
                .with_sort(by_year(Direction::Desc))
                .with_skip(1)
                .with_limit(2),
        )
        .await
        .unwrap();

    assert_eq!(titles(&found), vec!["Dune Messiah", "Dune"]);
}

#[tokio::test]
async fn find_one_and_find_by_id() {
    let ops = library().await;

    let oldest = ops
        .find_one::<Book>(Query::all().with_sort(by_year(Direction::Asc)))
        .await
        .unwrap();
    assert_eq!(oldest.map(|book| book.title), Some("Emma".to_string()));

    let found = ops.find_by_id::<Book, _>(4).await.unwrap();
    assert_eq!(found, Some(book(4, "Neuromancer", 1984, 15.0, "William Gibson", &["scifi", "cyberpunk"])));

    assert_eq!(ops.find_by_id::<Book, _>(42).await.unwrap(), None);
}

#[tokio::test]
async fn find_page_reports_neighbours() {
    let ops = library().await;

    let page = ops
        .find_page::<Book>(
            Query::all().with_sort(by_year(Direction::Asc)),
            &PaginationParams::new(2, 3),
        )
        .await
        .unwrap();

    assert_eq!(titles(&page.items), vec!["Neuromancer"]);
    assert_eq!(page.count, 4);
    assert_eq!(page.next_page, None);
    assert_eq!(page.previous_page, Some(1));

    let first = ops
        .find_page::<Book>(Query::all(), &PaginationParams::new(1, 3))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.next_page, Some(2));
    assert_eq!(first.previous_page, None);
}

#[tokio::test]
async fn count_exists_and_distinct() {
    let ops = library().await;

    assert_eq!(
        ops.count::<Book>(Query::new(BookFields::tags().all(["scifi"])))
            .await
            .unwrap(),
        3
    );
    assert!(ops
        .exists::<Book>(Query::new(BookFields::price().gt(14.0)))
        .await
        .unwrap());
    assert!(!ops
        .exists::<Book>(Query::new(BookFields::price().gt(100.0)))
        .await
        .unwrap());

    let mut tags = ops
        .find_distinct::<Book, String>(BookFields::tags().path(), Query::all())
        .await
        .unwrap();
    tags.sort();
    assert_eq!(tags, vec!["classic", "cyberpunk", "romance", "scifi"]);
}

#[tokio::test]
async fn fluent_find() {
    let ops = library().await;

    let scifi = ops
        .query::<Book>()
        .matching(BookFields::tags().all(["scifi"]));
    assert_eq!(scifi.count().await.unwrap(), 3);
    assert!(scifi.exists().await.unwrap());
    assert_eq!(scifi.first().await.unwrap().map(|book| book.id), Some(1));
    assert!(matches!(
        scifi.one().await,
        Err(OperationsError::IncorrectResultSize(2))
    ));

    let emma = ops
        .query::<Book>()
        .matching(BookFields::title().eq("Emma"))
        .as_type::<TitleOnly>()
        .one()
        .await
        .unwrap();
    assert_eq!(
        emma,
        Some(TitleOnly {
            title: "Emma".to_string()
        })
    );

    let archived = ops
        .query::<Book>()
        .in_collection("archive")
        .all()
        .await
        .unwrap();
    assert!(archived.is_empty());
}

#[tokio::test]
async fn update_first_and_multi() {
    let ops = library().await;

    let result = ops
        .update_multi::<Book>(
            Query::new((BookFields::author() / AuthorFields::name()).eq("Frank Herbert")),
            Update::new().inc(BookFields::price(), 2.5),
        )
        .await
        .unwrap();
    assert_eq!((result.matched, result.modified), (2, 2));

    let result = ops
        .update_first::<Book>(
            Query::new(BookFields::tags().all(["classic"])),
            Update::new()
                .push(BookFields::tags(), "bestseller")
                .set(BookFields::stock(), 3),
        )
        .await
        .unwrap();
    assert_eq!((result.matched, result.modified), (1, 1));
    assert_eq!(result.upserted_id, None);

    let dune = ops.find_by_id::<Book, _>(1).await.unwrap().unwrap();
    assert_eq!(dune.price, 12.5);
    assert_eq!(dune.tags, vec!["scifi", "classic", "bestseller"]);
    assert_eq!(dune.stock, Some(3));

    let messiah = ops.find_by_id::<Book, _>(2).await.unwrap().unwrap();
    assert_eq!(messiah.price, 15.0);
    assert_eq!(messiah.stock, None);
}

#[tokio::test]
async fn upsert_inserts_then_updates() {
    let ops = library().await;
    let persuasion = book(5, "Persuasion", 1817, 6.0, "Jane Austen", &["classic"]);

    let update = Update::new()
        .set(BookFields::title(), persuasion.title.clone())
        .set(BookFields::year(), persuasion.year)
        .set(BookFields::price(), persuasion.price)
        .set(BookFields::author(), persuasion.author.clone())
        .set(BookFields::tags(), persuasion.tags.clone());

    let inserted = ops
        .upsert::<Book>(Query::new(BookFields::id().eq(5)), update.clone())
        .await
        .unwrap();
    assert_eq!(inserted.matched, 0);
    assert_eq!(inserted.upserted_id, Some(Bson::Int32(5)));
    assert_eq!(ops.find_by_id::<Book, _>(5).await.unwrap(), Some(persuasion));

    let updated = ops
        .upsert::<Book>(
            Query::new(BookFields::id().eq(5)),
            Update::new().set(BookFields::price(), 7.0),
        )
        .await
        .unwrap();
    assert_eq!(updated.matched, 1);
    assert_eq!(updated.upserted_id, None);
    assert_eq!(ops.count::<Book>(Query::all()).await.unwrap(), 5);
}

#[tokio::test]
async fn find_and_modify_returns_old_or_new() {
    let ops = library().await;
    let emma = Query::new(BookFields::id().eq(3));

    let before = ops
        .find_and_modify::<Book>(
            emma.clone(),
            Update::new().set(BookFields::stock(), 7),
            FindAndModifyOptions::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.stock, None);

    let after = ops
        .find_and_modify::<Book>(
            emma,
            Update::new().inc(BookFields::stock(), 1),
            FindAndModifyOptions::new().return_new(true),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.stock, Some(8));

    let missing = ops
        .find_and_modify::<Book>(
            Query::new(BookFields::id().eq(42)),
            Update::new().set(BookFields::stock(), 1),
            FindAndModifyOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn find_and_remove_follows_sort() {
    let ops = library().await;

    let newest = ops
        .find_and_remove::<Book>(
            Query::new(BookFields::tags().all(["scifi"])).with_sort(by_year(Direction::Desc)),
        )
        .await
        .unwrap();
    assert_eq!(newest.map(|book| book.title), Some("Neuromancer".to_string()));
    assert_eq!(ops.count::<Book>(Query::all()).await.unwrap(), 3);

    let classics = ops
        .find_all_and_remove::<Book>(Query::new(BookFields::tags().all(["classic"])))
        .await
        .unwrap();
    assert_eq!(titles(&classics), vec!["Dune", "Emma"]);

    let left = ops.find_all::<Book>().await.unwrap();
    assert_eq!(titles(&left), vec!["Dune Messiah"]);
}

#[tokio::test]
async fn find_and_replace_keeps_the_stored_id() {
    let ops = library().await;
    let replacement = book(99, "Count Zero", 1986, 14.0, "William Gibson", &["scifi"]);

    let replaced = ops
        .find_and_replace::<Book>(
            Query::new(BookFields::id().eq(4)),
            &replacement,
            FindAndModifyOptions::new().return_new(true),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(replaced.id, 4);
    assert_eq!(replaced.title, "Count Zero");
    assert_eq!(ops.find_by_id::<Book, _>(99).await.unwrap(), None);
}

#[tokio::test]
async fn remove_and_save() {
    let ops = library().await;

    let removed = ops
        .remove::<Book>(Query::new(BookFields::year().lt(1900)))
        .await
        .unwrap();
    assert_eq!(removed.deleted, 1);
    assert_eq!(ops.remove_by_id::<Book, _>(2).await.unwrap().deleted, 1);

    let mut dune = ops.find_by_id::<Book, _>(1).await.unwrap().unwrap();
    dune.stock = Some(12);
    assert_eq!(ops.save(&dune).await.unwrap(), Bson::Int32(1));
    assert_eq!(ops.find_by_id::<Book, _>(1).await.unwrap(), Some(dune));
    assert_eq!(ops.count::<Book>(Query::all()).await.unwrap(), 2);
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let ops = library().await;

    let error = ops
        .insert(&book(1, "Dune again", 2021, 20.0, "Frank Herbert", &[]))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        OperationsError::DuplicateKey(_, ref collection) if collection == "books"
    ));
}

#[tokio::test]
async fn aggregate_groups_by_author() {
    let ops = library().await;

    let counts = ops
        .aggregate::<Book, AuthorCount>(
            Aggregation::new()
                .match_criteria(BookFields::year().gt(1900))
                .group(Group::by((BookFields::author() / AuthorFields::name()).path()).count("books"))
                .sort(Sort::by_path("_id", Direction::Asc)),
        )
        .await
        .unwrap();

    assert_eq!(
        counts,
        vec![
            AuthorCount {
                author: "Frank Herbert".to_string(),
                books: 2
            },
            AuthorCount {
                author: "William Gibson".to_string(),
                books: 1
            },
        ]
    );
}

#[tokio::test]
async fn geo_near_uses_the_geo_index() {
    let ops = InMemoryOperations::new();
    ops.insert_all(&[
        Venue {
            id: 1,
            name: "far".to_string(),
            location: [5.0, 0.0],
        },
        Venue {
            id: 2,
            name: "near".to_string(),
            location: [1.0, 0.0],
        },
        Venue {
            id: 3,
            name: "outside".to_string(),
            location: [50.0, 0.0],
        },
    ])
    .await
    .unwrap();
    ops.index_ops::<Venue>()
        .ensure_index(&Index::on(VenueFields::location(), IndexKind::Geo2d))
        .await
        .unwrap();

    let results = ops
        .geo_near::<Venue>(NearQuery::near(Point::new(0.0, 0.0)).max_distance(10.0))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results.results[0].content.name, "near");
    assert_eq!(results.results[0].distance.value, 1.0);
    assert_eq!(results.results[1].distance.value, 5.0);
    assert_eq!(results.average_distance.value, 3.0);
}

#[tokio::test]
async fn index_lifecycle() {
    let ops = library().await;
    let indexes = ops.index_ops::<Book>();

    let name = indexes
        .ensure_index(&Index::on(BookFields::title(), IndexKind::Ascending).unique())
        .await
        .unwrap();
    assert_eq!(name, "title_1");
    assert_eq!(indexes.index_names().await.unwrap(), vec!["_id_", "title_1"]);

    let error = ops
        .insert(&book(10, "Emma", 2009, 3.0, "Someone Else", &[]))
        .await
        .unwrap_err();
    assert!(matches!(error, OperationsError::DuplicateKey(..)));

    indexes.drop_index("title_1").await.unwrap();
    ops.insert(&book(10, "Emma", 2009, 3.0, "Someone Else", &[]))
        .await
        .unwrap();

    indexes
        .ensure_index(&Index::on(BookFields::year(), IndexKind::Descending))
        .await
        .unwrap();
    indexes.drop_all_indexes().await.unwrap();
    assert_eq!(indexes.index_names().await.unwrap(), vec!["_id_"]);
}

#[tokio::test]
async fn collection_lifecycle() {
    let ops = InMemoryOperations::new();

    assert!(!ops.collection_exists::<Venue>().await.unwrap());
    ops.create_collection::<Venue>().await.unwrap();
    assert!(ops.collection_exists::<Venue>().await.unwrap());
    assert!(ops.create_collection::<Venue>().await.is_err());

    ops.insert(&book(1, "Dune", 1965, 10.0, "Frank Herbert", &[]))
        .await
        .unwrap();
    assert_eq!(ops.collection_names().await.unwrap(), vec!["books", "venues"]);
    assert_eq!(ops.collection_name::<Book>(), "books");

    ops.drop_collection::<Venue>().await.unwrap();
    assert!(!ops.collection_exists::<Venue>().await.unwrap());
}

#[tokio::test]
async fn map_reduce_is_unsupported_in_memory() {
    let ops = library().await;

    let result = ops
        .map_reduce::<Book, bson::Document>(MapReduceOptions::new(
            "function() { emit(this.author.name, 1); }",
            "function(key, values) { return Array.sum(values); }",
        ))
        .await;
    assert!(matches!(result, Err(OperationsError::Unsupported(_))));
}

#[tokio::test]
async fn malformed_criteria_surface_as_operation_errors() {
    let ops = library().await;

    let result = ops
        .find::<Book>(Query::new(BookFields::price().gt(1.0).and(BookFields::price().lt(5.0))))
        .await;
    assert!(matches!(
        result,
        Err(OperationsError::Criteria(CriteriaError::InvalidApiUsage(_)))
    ));
}

async fn total_books<O: MongoOperations>(ops: O) -> u64 {
    ops.count::<Book>(Query::all()).await.unwrap()
}

#[tokio::test]
async fn operations_work_through_references() {
    let ops = library().await;

    assert_eq!(total_books(&ops).await, 4);
    ops.shutdown().await.unwrap();
}
