//! Migration and query workflow example.
//!
//! Creates a table from a descriptor, evolves it with an additive
//! migration, shows a rejected destructive change, and queries the data
//! back with query expressions.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p relstore-demos --example migrate_and_query
//! ```

use relstore_core::{
    Expr, FieldDefinition, IndexDescriptor, LogicalType, MigrationDescriptor, QueryExpression,
    Value,
};
use relstore_sqlite::{AdapterOptions, SqliteAdapter};

fn main() {
    let mut adapter = SqliteAdapter::new(AdapterOptions::memory());
    adapter.on_statement(|sql| println!("  sql> {sql}"));

    // === Step 1: Create the table ===
    println!("=== Initial migration ===");
    let mut v1 = MigrationDescriptor::new("books", "1.0")
        .adding(FieldDefinition::new("id", LogicalType::Counter))
        .adding(FieldDefinition::new("title", LogicalType::Text).with_size(200).not_null())
        .adding(FieldDefinition::new("price", LogicalType::Currency))
        .with_index(IndexDescriptor::new("idx_books_title", ["title"]))
        .with_model("Book");
    let outcome = adapter.migrate(&mut v1).unwrap();
    println!("books 1.0: {outcome} (code {})", outcome.code());

    // === Step 2: Running it again is a no-op ===
    let outcome = adapter.migrate(&mut v1).unwrap();
    println!("books 1.0 again: {outcome}, updated={}", v1.updated);

    // === Step 3: Additive change ===
    println!("\n=== Additive migration ===");
    let mut v2 = MigrationDescriptor::new("books", "1.1")
        .adding(FieldDefinition::new("published", LogicalType::Date));
    let outcome = adapter.migrate(&mut v2).unwrap();
    println!("books 1.1: {outcome}");

    // === Step 4: Destructive change is refused ===
    println!("\n=== Destructive migration ===");
    let mut v3 = MigrationDescriptor::new("books", "2.0")
        .changing(FieldDefinition::new("title", LogicalType::Integer));
    match adapter.migrate(&mut v3) {
        Ok(outcome) => println!("unexpected: {outcome}"),
        Err(err) => println!("refused: {err}"),
    }
    println!("books version is still {}", adapter.version("books").unwrap());

    // === Step 5: Insert and query ===
    println!("\n=== Queries ===");
    for (title, price) in [("Dune", 9.99), ("Emma", 4.5)] {
        let insert = QueryExpression::insert("books")
            .set("title", Value::from(title))
            .set("price", Value::from(price));
        adapter.execute(&insert, &[]).unwrap();
    }

    let cheap = QueryExpression::select("books")
        .field(Expr::field("title"))
        .field(Expr::field("published"))
        .filter(Expr::field("price").lt(Expr::Placeholder))
        .order_by(Expr::field("title"), false);
    let rows = adapter
        .execute(&cheap, &[Value::from(5.0)])
        .unwrap()
        .into_rows();
    for row in &rows {
        // `published` is null, so it is absent from the row.
        println!("{}", serde_json::to_string(row).unwrap());
    }

    // === Step 6: Identity ledger ===
    let next = adapter.select_identity("books", "id").unwrap();
    println!("\nnext book id: {next}");

    adapter.close();
}
