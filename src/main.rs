use anyhow::{bail, Result};
use std::env;

use lending_catalog::{logging, Library, LibraryConfig, SystemClock};

const DEFAULT_CONFIG: &str = "lending-catalog.toml";

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    // --config <file> may appear before the command
    let mut config_path = DEFAULT_CONFIG.to_string();
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            bail!("--config needs a file path");
        }
        config_path = args.remove(1);
        args.remove(0);
    }

    let config = LibraryConfig::load(&config_path)?;
    logging::init_logging(&config.logging)?;

    let store = config.open_store()?;
    let mut library = Library::open(store, Box::new(SystemClock));

    let command = args.first().map(String::as_str).unwrap_or("books");
    let query = args.get(1).map(String::as_str);

    match command {
        "books" => show_books(&mut library, query),
        "patrons" => show_patrons(&mut library, query),
        "loans" => show_loans(&library),
        "overdue" => show_overdue(&library),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            print_usage();
            bail!("Unknown command: {}", other);
        }
    }

    Ok(())
}

fn show_books(library: &mut Library, query: Option<&str>) {
    library.filter_books(query);
    let books = library.books_view();

    println!("📚 Catalog");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if books.is_empty() {
        println!("   (no books)");
    }
    for book in &books {
        println!(
            "   {} - {} / {} available",
            book,
            book.available_copies(),
            book.total_copies()
        );
    }
    println!("\n✓ {} of {} books", books.len(), library.catalog().len());
}

fn show_patrons(library: &mut Library, query: Option<&str>) {
    library.filter_patrons(query);
    let patrons = library.patrons_view();

    println!("🎓 Patrons");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if patrons.is_empty() {
        println!("   (no patrons)");
    }
    for patron in &patrons {
        println!("   {}", patron);
    }
    println!("\n✓ {} of {} patrons", patrons.len(), library.patrons().len());
}

fn show_loans(library: &Library) {
    let rows = library.loans_view();

    println!("🔖 Active loans ({})", library.today());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if rows.is_empty() {
        println!("   (no loans)");
    }
    for row in &rows {
        println!("   {}", row);
    }
    println!("\n✓ {} loans", rows.len());
}

fn show_overdue(library: &Library) {
    let rows = library.overdue_loans();

    println!("⏰ Overdue loans ({})", library.today());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in &rows {
        println!("   ❌ {}", row);
    }
    if rows.is_empty() {
        println!("✅ Nothing overdue");
    } else {
        println!("\n⚠️  {} overdue", rows.len());
    }
}

fn print_usage() {
    println!("Lending Catalog v{}", lending_catalog::VERSION);
    println!();
    println!("Usage: lending-catalog [--config <file>] <command>");
    println!();
    println!("Commands:");
    println!("   books [query]     List books, optionally filtered by title/author/ISBN");
    println!("   patrons [query]   List patrons, optionally filtered by surname/matricola");
    println!("   loans             List active loans");
    println!("   overdue           List loans past their due date");
}
