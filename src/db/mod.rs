mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::*;
use crate::pipeline::ArtifactStore;

const PROJECT_COLUMNS: &str = "id, name, description, source, date_column, value_column, product_column,
    aggregation_period, aggregation_completed, features_generated, date_features, numerical_features,
    created_at, updated_at";

const SOURCE_COLUMNS: &str = "id, project_id, name, file_path, date_column, selected_columns,
    column_aggregations, fill_method, product_column, created_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database when none is configured.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "ml-constructor")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("ml-constructor.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects ORDER BY created_at DESC",
            PROJECT_COLUMNS
        ))?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                &format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, source, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.description,
                to_json_opt(&input.source)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name: input.name,
            description: input.description,
            source: input.source,
            date_column: None,
            value_column: None,
            product_column: None,
            aggregation_period: None,
            aggregation_completed: false,
            features_generated: false,
            date_features: None,
            numerical_features: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let project = Project {
            name: input.name.unwrap_or(existing.name),
            description: input.description.or(existing.description),
            source: input.source.or(existing.source),
            date_column: input.date_column.or(existing.date_column),
            value_column: input.value_column.or(existing.value_column),
            product_column: input.product_column.or(existing.product_column),
            updated_at: now,
            ..existing
        };

        conn.execute(
            "UPDATE projects SET name = ?, description = ?, source = ?, date_column = ?,
             value_column = ?, product_column = ?, updated_at = ? WHERE id = ?",
            (
                &project.name,
                &project.description,
                to_json_opt(&project.source)?,
                &project.date_column,
                &project.value_column,
                &project.product_column,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(project))
    }

    /// Set the primary source's column mapping. An absent product column
    /// clears any previous one.
    pub fn set_column_mapping(&self, id: Uuid, mapping: ColumnMapping) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE projects SET date_column = ?, value_column = ?, product_column = ?, updated_at = ?
             WHERE id = ?",
            (
                &mapping.date_column,
                &mapping.value_column,
                &mapping.product_column,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(Project {
            date_column: Some(mapping.date_column),
            value_column: Some(mapping.value_column),
            product_column: mapping.product_column,
            updated_at: now,
            ..existing
        }))
    }

    /// Delete a project together with its secondary sources and artifacts.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Secondary source operations
    // ============================================================

    pub fn get_secondary_sources(&self, project_id: Uuid) -> Result<Vec<SecondarySource>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM secondary_sources WHERE project_id = ? ORDER BY created_at, rowid",
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map([project_id.to_string()], source_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sources)
    }

    pub fn get_secondary_source(&self, id: Uuid) -> Result<Option<SecondarySource>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let source = conn
            .query_row(
                &format!("SELECT {} FROM secondary_sources WHERE id = ?", SOURCE_COLUMNS),
                [id.to_string()],
                source_from_row,
            )
            .optional()?;
        Ok(source)
    }

    pub fn create_secondary_source(
        &self,
        project_id: Uuid,
        input: CreateSecondarySourceInput,
    ) -> Result<SecondarySource> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let source = SecondarySource {
            id: Uuid::new_v4(),
            project_id,
            name: input.name,
            file_path: input.file_path,
            date_column: None,
            selected_columns: Vec::new(),
            column_aggregations: Default::default(),
            fill_method: FillPolicy::default(),
            product_column: None,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO secondary_sources (id, project_id, name, file_path, fill_method, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                source.id.to_string(),
                project_id.to_string(),
                &source.name,
                &source.file_path,
                source.fill_method.as_str(),
                source.created_at.to_rfc3339(),
            ),
        )?;

        Ok(source)
    }

    pub fn map_secondary_columns(
        &self,
        id: Uuid,
        input: MapSourceColumnsInput,
    ) -> Result<Option<SecondarySource>> {
        let Some(existing) = self.get_secondary_source(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE secondary_sources SET date_column = ?, selected_columns = ?,
             column_aggregations = ?, fill_method = ?, product_column = ? WHERE id = ?",
            (
                &input.date_column,
                serde_json::to_string(&input.selected_columns)?,
                serde_json::to_string(&input.column_aggregations)?,
                input.fill_method.as_str(),
                &input.product_column,
                id.to_string(),
            ),
        )?;

        Ok(Some(SecondarySource {
            date_column: Some(input.date_column),
            selected_columns: input.selected_columns,
            column_aggregations: input.column_aggregations,
            fill_method: input.fill_method,
            product_column: input.product_column,
            ..existing
        }))
    }

    pub fn delete_secondary_source(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM secondary_sources WHERE id = ?",
            [id.to_string()],
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Aggregated artifact operations
    // ============================================================

    pub fn get_aggregated_artifact(&self, project_id: Uuid) -> Result<Option<AggregatedArtifact>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let artifact = conn
            .query_row(
                "SELECT id, project_id, period, columns, row_count, data, created_at
                 FROM aggregated_data WHERE project_id = ?",
                [project_id.to_string()],
                |row| {
                    let period: String = row.get(2)?;
                    Ok(AggregatedArtifact {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        project_id: parse_uuid(row.get::<_, String>(1)?),
                        period: Granularity::from_str(&period).unwrap_or(Granularity::Monthly),
                        table: ArtifactData {
                            columns: parse_json(row, 3)?,
                            row_count: row.get(4)?,
                            data: parse_json(row, 5)?,
                        },
                        created_at: parse_datetime(row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()?;
        Ok(artifact)
    }

    /// Swap in a new aggregated artifact and mark the project as aggregated,
    /// in one transaction.
    pub fn replace_aggregated_artifact(&self, artifact: &AggregatedArtifact) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let project_id = artifact.project_id.to_string();

        tx.execute("DELETE FROM aggregated_data WHERE project_id = ?", [&project_id])?;
        tx.execute(
            "INSERT INTO aggregated_data (id, project_id, period, columns, row_count, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                artifact.id.to_string(),
                &project_id,
                artifact.period.as_str(),
                serde_json::to_string(&artifact.table.columns)?,
                artifact.table.row_count,
                serde_json::to_string(&artifact.table.data)?,
                artifact.created_at.to_rfc3339(),
            ),
        )?;
        let updated = tx.execute(
            "UPDATE projects SET aggregation_period = ?, aggregation_completed = 1, updated_at = ?
             WHERE id = ?",
            (artifact.period.as_str(), Utc::now().to_rfc3339(), &project_id),
        )?;
        if updated == 0 {
            anyhow::bail!("Project not found");
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove the aggregated artifact and clear the project's aggregation flag.
    /// Returns the number of artifacts removed.
    pub fn delete_aggregated_artifact(&self, project_id: Uuid) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM aggregated_data WHERE project_id = ?",
            [project_id.to_string()],
        )?;
        tx.execute(
            "UPDATE projects SET aggregation_completed = 0, updated_at = ? WHERE id = ?",
            (Utc::now().to_rfc3339(), project_id.to_string()),
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // ============================================================
    // Feature artifact operations
    // ============================================================

    pub fn get_feature_artifact(&self, project_id: Uuid) -> Result<Option<FeatureArtifact>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let artifact = conn
            .query_row(
                "SELECT id, project_id, columns, row_count, data, feature_config, created_at
                 FROM feature_data WHERE project_id = ?",
                [project_id.to_string()],
                |row| {
                    Ok(FeatureArtifact {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        project_id: parse_uuid(row.get::<_, String>(1)?),
                        table: ArtifactData {
                            columns: parse_json(row, 2)?,
                            row_count: row.get(3)?,
                            data: parse_json(row, 4)?,
                        },
                        feature_config: parse_json(row, 5)?,
                        created_at: parse_datetime(row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()?;
        Ok(artifact)
    }

    /// Swap in a new feature artifact and record the feature settings on the
    /// project, in one transaction.
    pub fn replace_feature_artifact(&self, artifact: &FeatureArtifact) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let project_id = artifact.project_id.to_string();

        tx.execute("DELETE FROM feature_data WHERE project_id = ?", [&project_id])?;
        tx.execute(
            "INSERT INTO feature_data (id, project_id, columns, row_count, data, feature_config, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                artifact.id.to_string(),
                &project_id,
                serde_json::to_string(&artifact.table.columns)?,
                artifact.table.row_count,
                serde_json::to_string(&artifact.table.data)?,
                serde_json::to_string(&artifact.feature_config)?,
                artifact.created_at.to_rfc3339(),
            ),
        )?;
        let updated = tx.execute(
            "UPDATE projects SET features_generated = 1, date_features = ?, numerical_features = ?,
             updated_at = ? WHERE id = ?",
            (
                serde_json::to_string(&artifact.feature_config.date_features)?,
                serde_json::to_string(&artifact.feature_config.numerical_features)?,
                Utc::now().to_rfc3339(),
                &project_id,
            ),
        )?;
        if updated == 0 {
            anyhow::bail!("Project not found");
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove the feature artifact and clear the project's feature flag.
    pub fn delete_feature_artifact(&self, project_id: Uuid) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM feature_data WHERE project_id = ?",
            [project_id.to_string()],
        )?;
        tx.execute(
            "UPDATE projects SET features_generated = 0, updated_at = ? WHERE id = ?",
            (Utc::now().to_rfc3339(), project_id.to_string()),
        )?;
        tx.commit()?;
        Ok(deleted)
    }
}

impl ArtifactStore for Database {
    fn project(&self, id: Uuid) -> Result<Option<Project>> {
        self.get_project(id)
    }

    fn secondary_sources(&self, project_id: Uuid) -> Result<Vec<SecondarySource>> {
        self.get_secondary_sources(project_id)
    }

    fn aggregated_artifact(&self, project_id: Uuid) -> Result<Option<AggregatedArtifact>> {
        self.get_aggregated_artifact(project_id)
    }

    fn replace_aggregated(&self, artifact: &AggregatedArtifact) -> Result<()> {
        self.replace_aggregated_artifact(artifact)
    }

    fn replace_features(&self, artifact: &FeatureArtifact) -> Result<()> {
        self.replace_feature_artifact(artifact)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        source: parse_json_opt(row, 3)?,
        date_column: row.get(4)?,
        value_column: row.get(5)?,
        product_column: row.get(6)?,
        aggregation_period: row
            .get::<_, Option<String>>(7)?
            .and_then(|p| Granularity::from_str(&p)),
        aggregation_completed: row.get::<_, i32>(8)? != 0,
        features_generated: row.get::<_, i32>(9)? != 0,
        date_features: parse_json_opt(row, 10)?,
        numerical_features: parse_json_opt(row, 11)?,
        created_at: parse_datetime(row.get::<_, String>(12)?),
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<SecondarySource> {
    Ok(SecondarySource {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        file_path: row.get(3)?,
        date_column: row.get(4)?,
        selected_columns: parse_json(row, 5)?,
        column_aggregations: parse_json(row, 6)?,
        fill_method: FillPolicy::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        product_column: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn parse_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json_opt<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_json(row, idx).map(Some),
        None => Ok(None),
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
