use crate::core::ContentKind;
use crate::db::models::Article;
use crate::errors::Error;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Repository for the article fields the pipeline stages touch. The wider
/// CRUD surface around articles lives elsewhere; only enrichment results
/// and per-stage statuses are written here.
pub struct ArticleRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> ArticleRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        ArticleRepository { conn }
    }

    pub fn insert_article(&mut self, article: &Article) -> Result<(), Error> {
        use crate::schema::articles;

        diesel::insert_into(articles::table)
            .values(article)
            .execute(self.conn)?;
        Ok(())
    }

    pub fn get_article(&mut self, article_id: &str) -> Result<Article, Error> {
        use crate::schema::articles::dsl::*;

        articles
            .filter(id.eq(article_id))
            .first::<Article>(self.conn)
            .optional()?
            .ok_or_else(|| Error::UnknownArticle(article_id.to_string()))
    }

    /// Stores the cleaning stage's output.
    pub fn set_cleaned(&mut self, article_id: &str, cleaned: &str) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((cleaned_md.eq(cleaned), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    /// Stores the classification result.
    pub fn set_classification(
        &mut self,
        article_id: &str,
        the_category: &str,
        the_language: &str,
    ) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((
                category.eq(the_category),
                language.eq(the_language),
                updated_at.eq(now),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    /// Stores one generated content field and marks it completed. The
    /// content kind selects a fixed column pair; one match arm per kind.
    pub fn set_generated(
        &mut self,
        article_id: &str,
        kind: ContentKind,
        text: &str,
    ) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        let target = articles.filter(id.eq(article_id));
        match kind {
            ContentKind::Summary => diesel::update(target)
                .set((summary.eq(text), summary_status.eq("completed"), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::Outline => diesel::update(target)
                .set((outline.eq(text), outline_status.eq("completed"), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::KeyPoints => diesel::update(target)
                .set((key_points.eq(text), key_points_status.eq("completed"), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::Quotes => diesel::update(target)
                .set((quotes.eq(text), quotes_status.eq("completed"), updated_at.eq(now)))
                .execute(self.conn)?,
        };
        Ok(())
    }

    /// Updates the status column of one generated content field.
    pub fn set_content_status(
        &mut self,
        article_id: &str,
        kind: ContentKind,
        new_status: &str,
    ) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        let target = articles.filter(id.eq(article_id));
        match kind {
            ContentKind::Summary => diesel::update(target)
                .set((summary_status.eq(new_status), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::Outline => diesel::update(target)
                .set((outline_status.eq(new_status), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::KeyPoints => diesel::update(target)
                .set((key_points_status.eq(new_status), updated_at.eq(now)))
                .execute(self.conn)?,
            ContentKind::Quotes => diesel::update(target)
                .set((quotes_status.eq(new_status), updated_at.eq(now)))
                .execute(self.conn)?,
        };
        Ok(())
    }

    /// Stores the translation and marks it completed.
    pub fn set_translation(&mut self, article_id: &str, text: &str) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((
                translation_md.eq(text),
                translation_status.eq("completed"),
                updated_at.eq(now),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    pub fn set_translation_status(
        &mut self,
        article_id: &str,
        new_status: &str,
    ) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((translation_status.eq(new_status), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    pub fn set_embedding(&mut self, article_id: &str, vector_json: &str) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((embedding.eq(vector_json), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    pub fn set_status(&mut self, article_id: &str, new_status: &str) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((status.eq(new_status), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    /// Records a stage failure on the article.
    pub fn record_error(&mut self, article_id: &str, error: &str) -> Result<(), Error> {
        use crate::schema::articles::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(articles.filter(id.eq(article_id)))
            .set((last_error.eq(error), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }
}
