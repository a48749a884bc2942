use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::store::PersistenceStore;
use bon::Builder;
use rusqlite::{params, Connection, Transaction};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

pub static DB_NAME: &str = "hungryapp.db";
static SCHEMA_VERSION: i32 = 7;

static SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recipe (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    ingredients TEXT NOT NULL,
    directions TEXT NOT NULL,
    cookingTime TEXT NOT NULL,
    picture TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS product (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    is_bought INTEGER NOT NULL DEFAULT 0,
    rank INTEGER NOT NULL DEFAULT 0
);
";

/// First-run population, run inside the schema-creating transaction
pub type Initializer = Box<dyn Fn(&Transaction<'_>) -> Result<()> + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub ingredients: String,
    pub directions: String,
    pub cooking_time: String,
    pub picture: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Builder)]
pub struct NewRecipe {
    #[builder(into)]
    pub title: String,
    #[builder(default, into)]
    pub ingredients: String,
    #[builder(default, into)]
    pub directions: String,
    #[builder(default, into)]
    pub cooking_time: String,
    #[builder(default, into)]
    pub picture: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub is_bought: bool,
    pub rank: i64,
}

fn insert_recipe(conn: &Connection, recipe: &NewRecipe) -> Result<i64> {
    conn.execute(
        "INSERT INTO recipe (title, ingredients, directions, cookingTime, picture)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            recipe.title,
            recipe.ingredients,
            recipe.directions,
            recipe.cooking_time,
            recipe.picture
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Seeds a fresh database with one recipe.
pub fn seed_recipe(recipe: NewRecipe) -> Initializer {
    Box::new(move |tx: &Transaction<'_>| {
        let id = insert_recipe(tx, &recipe)?;
        tracing::info!("Pre-populated recipe {} ({:?})", id, recipe.title);
        Ok(())
    })
}

/// Recipe and shopping-list store backed by one SQLite file in `dir`
pub struct SqliteRecipeStore {
    dir: PathBuf,
    conn: Option<Connection>,
    initializer: Option<Initializer>,
}

impl Debug for SqliteRecipeStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecipeStore")
            .field("dir", &self.dir)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SqliteRecipeStore {
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        Self::open_with_initializer(dir, None)
    }

    /// Opens the store, creating the schema and running `initializer` when
    /// the database file is new. Returns once initialization is committed.
    pub fn open_with_initializer<P: Into<PathBuf>>(
        dir: P,
        initializer: Option<Initializer>,
    ) -> Result<Self> {
        let mut store = Self {
            dir: dir.into(),
            conn: None,
            initializer,
        };
        store.conn = Some(store.connect()?);
        Ok(store)
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_NAME)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(&self) -> Result<Connection> {
        std::fs::create_dir_all(&self.dir)?;
        let db_path = self.db_path();
        let mut conn = Connection::open(&db_path)
            .map_err(Error::from)
            .with_msg(format!("Opening {:?} failed", db_path))?;

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA)?;
            if let Some(initializer) = &self.initializer {
                initializer(&tx).with_msg("Pre-populating database failed")?;
            }
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            tracing::info!("Created schema version {} in {:?}", SCHEMA_VERSION, db_path);
        } else {
            tracing::debug!("Opened {:?} at schema version {}", db_path, version);
        }
        Ok(conn)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::StoreClosed)
    }

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        insert_recipe(self.conn()?, recipe)
    }

    pub fn recipes(&self) -> Result<Vec<Recipe>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, ingredients, directions, cookingTime, picture
             FROM recipe ORDER BY id",
        )?;
        let recipes = stmt
            .query_map([], |row| {
                Ok(Recipe {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    ingredients: row.get(2)?,
                    directions: row.get(3)?,
                    cooking_time: row.get(4)?,
                    picture: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(recipes)
    }

    /// Appends a product at the end of the shopping list.
    pub fn insert_product<S: AsRef<str>>(&self, title: S) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO product (title, is_bought, rank)
             VALUES (?1, 0, (SELECT COALESCE(MAX(rank), -1) + 1 FROM product))",
            params![title.as_ref()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_product_bought(&self, id: i64, is_bought: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE product SET is_bought = ?1 WHERE id = ?2",
            params![is_bought, id],
        )?;
        Ok(())
    }

    pub fn products(&self) -> Result<Vec<Product>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, title, is_bought, rank FROM product ORDER BY rank, id")?;
        let products = stmt
            .query_map([], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    is_bought: row.get(2)?,
                    rank: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }
}

impl PersistenceStore for SqliteRecipeStore {
    fn backing_dir(&self) -> Option<&Path> {
        Some(self.dir.as_path())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| Error::from(e))
                .with_msg(format!("Closing {:?} failed", self.db_path()))?;
            tracing::debug!("Closed {:?}", self.db_path());
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        if self.conn.is_none() {
            self.conn = Some(self.connect()?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema_and_runs_initializer_once() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("databases");
        let seed = || Some(seed_recipe(NewRecipe::builder().title("Fried eggs").build()));

        let mut store = SqliteRecipeStore::open_with_initializer(&dir, seed()).unwrap();
        assert_eq!(store.recipes().unwrap().len(), 1);
        assert_eq!(store.recipes().unwrap()[0].title, "Fried eggs");

        store.close().unwrap();
        store.reopen().unwrap();
        assert_eq!(store.recipes().unwrap().len(), 1);

        drop(store);
        let store = SqliteRecipeStore::open_with_initializer(&dir, seed()).unwrap();
        assert_eq!(store.recipes().unwrap().len(), 1);
    }

    #[test]
    fn test_failing_initializer_leaves_no_schema() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("databases");
        let failing: Initializer = Box::new(|_: &Transaction<'_>| Err(Error::StoreClosed));

        assert!(SqliteRecipeStore::open_with_initializer(&dir, Some(failing)).is_err());

        let store = SqliteRecipeStore::open(&dir).unwrap();
        assert!(store.recipes().unwrap().is_empty());
    }

    #[test]
    fn test_closed_store_rejects_queries() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SqliteRecipeStore::open(temp_dir.path()).unwrap();
        store.close().unwrap();

        assert!(!store.is_open());
        assert!(matches!(store.recipes(), Err(Error::StoreClosed)));
        assert_eq!(store.backing_dir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_products_keep_insertion_rank() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRecipeStore::open(temp_dir.path()).unwrap();
        let milk = store.insert_product("milk").unwrap();
        store.insert_product("eggs").unwrap();
        store.set_product_bought(milk, true).unwrap();

        let products = store.products().unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].title, "milk");
        assert_eq!(products[0].rank, 0);
        assert!(products[0].is_bought);
        assert_eq!(products[1].title, "eggs");
        assert_eq!(products[1].rank, 1);
        assert!(!products[1].is_bought);
    }

    #[test]
    fn test_recipe_fields_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRecipeStore::open(temp_dir.path()).unwrap();
        let new = NewRecipe::builder()
            .title("Pancakes")
            .ingredients("flour\nmilk")
            .directions("mix, fry")
            .cooking_time("20 min")
            .picture("images/1/p.jpg")
            .build();
        let id = store.insert_recipe(&new).unwrap();

        let recipes = store.recipes().unwrap();
        assert_eq!(
            recipes,
            vec![Recipe {
                id,
                title: new.title,
                ingredients: new.ingredients,
                directions: new.directions,
                cooking_time: new.cooking_time,
                picture: new.picture,
            }]
        );
    }
}
