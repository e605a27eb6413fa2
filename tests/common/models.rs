//! Content types and fixtures for exercising the state machine.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use diesel::{prelude::*, result::Error as DbError, sql_types::Integer};
use failure::Error;
use publisher::{
    db::Connection,
    permissions::PermissionBits,
    versioning::{Relation, Translated, ValidationError, Versioned, VersionedRecord},
};

use super::schema::{
    article_attachments,
    article_links,
    article_tags,
    articles,
    page_links,
    page_translations,
    pages,
    tags,
};

pub struct TestUser {
    pub permissions: PermissionBits,
}

impl TestUser {
    pub fn publisher() -> TestUser {
        TestUser { permissions: PermissionBits::PUBLISH_CONTENT }
    }

    pub fn editor() -> TestUser {
        TestUser { permissions: PermissionBits::EDIT_CONTENT }
    }
}

/// A standalone versioned entity, with owned children (attachments),
/// associations (tags), and external references (links).
pub enum Article {}

impl Versioned for Article {
    const TABLE: &'static str = "articles";
    const CONTENT_COLUMNS: &'static [&'static str] =
        &["title", "body", "view_count"];
    // Hit counter, maintained per row.
    const COPY_EXCLUDE_COLUMNS: &'static [&'static str] = &["view_count"];

    type User = TestUser;

    fn relations() -> &'static [Relation] {
        const RELATIONS: &[Relation] = &[
            Relation::new("article_attachments", "article"),
            Relation::new("article_tags", "article"),
            Relation::new("article_links", "article"),
        ];
        RELATIONS
    }

    fn update_relations_exclude(_old: &VersionedRecord) -> Vec<Relation> {
        // Attachments and tag associations are re-created by copy_relations;
        // only external links get re-pointed.
        vec![
            Relation::new("article_attachments", "article"),
            Relation::new("article_tags", "article"),
        ]
    }

    fn copy_relations(
        dbconn: &Connection,
        old: &VersionedRecord,
        new: &VersionedRecord,
    ) -> Result<(), DbError> {
        diesel::delete(article_attachments::table
            .filter(article_attachments::article.eq(new.id)))
            .execute(dbconn)?;
        diesel::sql_query(
            "INSERT INTO article_attachments (article, name) \
             SELECT $2, name FROM article_attachments WHERE article = $1")
            .bind::<Integer, _>(old.id)
            .bind::<Integer, _>(new.id)
            .execute(dbconn)?;

        diesel::delete(article_tags::table
            .filter(article_tags::article.eq(new.id)))
            .execute(dbconn)?;
        diesel::sql_query(
            "INSERT INTO article_tags (article, tag) \
             SELECT $2, tag FROM article_tags WHERE article = $1")
            .bind::<Integer, _>(old.id)
            .bind::<Integer, _>(new.id)
            .execute(dbconn)?;

        Ok(())
    }

    fn can_publish(dbconn: &Connection, draft: &VersionedRecord)
    -> Result<(), ValidationError> {
        let title: String = articles::table
            .find(draft.id)
            .select(articles::title)
            .get_result(dbconn)
            .map_err(|e| ValidationError::new(e.to_string()))?;

        if title.trim().is_empty() {
            return Err(ValidationError::new("title must not be empty"));
        }

        Ok(())
    }

    fn user_can_publish(
        _: &Connection,
        _: &VersionedRecord,
        user: &TestUser,
    ) -> bool {
        user.permissions.contains(PermissionBits::PUBLISH_CONTENT)
    }
}

/// The language-independent master of a translated page.
pub enum Page {}

impl Versioned for Page {
    const TABLE: &'static str = "pages";
    const CONTENT_COLUMNS: &'static [&'static str] = &["template"];

    type User = TestUser;

    fn relations() -> &'static [Relation] {
        // Translations hang off the master too, but they are managed by the
        // translation layer, never by blind re-pointing.
        const RELATIONS: &[Relation] = &[Relation::new("page_links", "page")];
        RELATIONS
    }

    fn user_can_publish(
        _: &Connection,
        _: &VersionedRecord,
        user: &TestUser,
    ) -> bool {
        user.permissions.contains(PermissionBits::PUBLISH_CONTENT)
    }
}

/// One language of a page.
pub enum PageTranslation {}

impl Versioned for PageTranslation {
    const TABLE: &'static str = "page_translations";
    const CONTENT_COLUMNS: &'static [&'static str] = &["title", "body"];

    type User = TestUser;

    fn relations() -> &'static [Relation] {
        &[]
    }

    fn can_publish(dbconn: &Connection, draft: &VersionedRecord)
    -> Result<(), ValidationError> {
        let title: String = page_translations::table
            .find(draft.id)
            .select(page_translations::title)
            .get_result(dbconn)
            .map_err(|e| ValidationError::new(e.to_string()))?;

        if title.trim().is_empty() {
            return Err(ValidationError::new("title must not be empty"));
        }

        Ok(())
    }

    fn user_can_publish(
        _: &Connection,
        _: &VersionedRecord,
        user: &TestUser,
    ) -> bool {
        user.permissions.contains(PermissionBits::PUBLISH_CONTENT)
    }
}

impl Translated for PageTranslation {
    type Master = Page;
}

#[derive(Debug, Queryable)]
pub struct ArticleRow {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub view_count: i32,
    pub is_published: bool,
    pub published_counterpart: Option<i32>,
    pub published_at: Option<NaiveDateTime>,
    pub deletion_requested: bool,
}

#[derive(Debug, Queryable)]
pub struct PageRow {
    pub id: i32,
    pub template: String,
    pub is_published: bool,
    pub published_counterpart: Option<i32>,
    pub published_at: Option<NaiveDateTime>,
    pub deletion_requested: bool,
}

#[derive(Debug, Queryable)]
pub struct PageTranslationRow {
    pub id: i32,
    pub master: i32,
    pub language_code: String,
    pub title: String,
    pub body: String,
    pub is_published: bool,
    pub published_counterpart: Option<i32>,
    pub published_at: Option<NaiveDateTime>,
    pub deletion_requested: bool,
}

#[derive(Insertable)]
#[table_name = "articles"]
struct NewArticle<'a> {
    title: &'a str,
    body: &'a str,
}

/// Insert a fresh, never-published article draft.
pub fn create_article(dbconn: &Connection, title: &str, body: &str)
-> Result<ArticleRow, Error> {
    diesel::insert_into(articles::table)
        .values(&NewArticle { title, body })
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn get_article(dbconn: &Connection, id: i32)
-> Result<Option<ArticleRow>, Error> {
    articles::table
        .find(id)
        .get_result(dbconn)
        .optional()
        .map_err(From::from)
}

pub fn update_article(dbconn: &Connection, id: i32, title: &str, body: &str)
-> Result<(), Error> {
    diesel::update(articles::table.find(id))
        .set((articles::title.eq(title), articles::body.eq(body)))
        .execute(dbconn)?;
    Ok(())
}

pub fn set_view_count(dbconn: &Connection, id: i32, count: i32)
-> Result<(), Error> {
    diesel::update(articles::table.find(id))
        .set(articles::view_count.eq(count))
        .execute(dbconn)?;
    Ok(())
}

pub fn add_attachment(dbconn: &Connection, article: i32, name: &str)
-> Result<(), Error> {
    diesel::insert_into(article_attachments::table)
        .values((
            article_attachments::article.eq(article),
            article_attachments::name.eq(name),
        ))
        .execute(dbconn)?;
    Ok(())
}

pub fn attachment_names(dbconn: &Connection, article: i32)
-> Result<Vec<String>, Error> {
    article_attachments::table
        .filter(article_attachments::article.eq(article))
        .select(article_attachments::name)
        .order(article_attachments::name)
        .load(dbconn)
        .map_err(From::from)
}

pub fn create_tag(dbconn: &Connection, name: &str) -> Result<i32, Error> {
    diesel::insert_into(tags::table)
        .values(tags::name.eq(name))
        .returning(tags::id)
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn tag_article(dbconn: &Connection, article: i32, tag: i32)
-> Result<(), Error> {
    diesel::insert_into(article_tags::table)
        .values((
            article_tags::article.eq(article),
            article_tags::tag.eq(tag),
        ))
        .execute(dbconn)?;
    Ok(())
}

pub fn tags_of_article(dbconn: &Connection, article: i32)
-> Result<Vec<i32>, Error> {
    article_tags::table
        .filter(article_tags::article.eq(article))
        .select(article_tags::tag)
        .order(article_tags::tag)
        .load(dbconn)
        .map_err(From::from)
}

pub fn add_article_link(dbconn: &Connection, article: i32, name: &str)
-> Result<i32, Error> {
    diesel::insert_into(article_links::table)
        .values((
            article_links::article.eq(article),
            article_links::name.eq(name),
        ))
        .returning(article_links::id)
        .get_result(dbconn)
        .map_err(From::from)
}

/// Which article a link row points at, or `None` once the link is gone.
pub fn article_link_target(dbconn: &Connection, link: i32)
-> Result<Option<i32>, Error> {
    article_links::table
        .find(link)
        .select(article_links::article)
        .get_result(dbconn)
        .optional()
        .map_err(From::from)
}

/// Insert a fresh, never-published page master draft.
pub fn create_page(dbconn: &Connection, template: &str)
-> Result<PageRow, Error> {
    diesel::insert_into(pages::table)
        .values(pages::template.eq(template))
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn get_page(dbconn: &Connection, id: i32)
-> Result<Option<PageRow>, Error> {
    pages::table
        .find(id)
        .get_result(dbconn)
        .optional()
        .map_err(From::from)
}

pub fn page_count(dbconn: &Connection) -> Result<i64, Error> {
    pages::table.count().get_result(dbconn).map_err(From::from)
}

#[derive(Insertable)]
#[table_name = "page_translations"]
struct NewPageTranslation<'a> {
    master: i32,
    language_code: &'a str,
    title: &'a str,
    body: &'a str,
}

/// Insert a draft translation under a page master.
pub fn create_translation(
    dbconn: &Connection,
    master: i32,
    language: &str,
    title: &str,
    body: &str,
) -> Result<PageTranslationRow, Error> {
    diesel::insert_into(page_translations::table)
        .values(&NewPageTranslation {
            master,
            language_code: language,
            title,
            body,
        })
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn get_translation(dbconn: &Connection, id: i32)
-> Result<Option<PageTranslationRow>, Error> {
    page_translations::table
        .find(id)
        .get_result(dbconn)
        .optional()
        .map_err(From::from)
}

pub fn update_translation(dbconn: &Connection, id: i32, title: &str)
-> Result<(), Error> {
    diesel::update(page_translations::table.find(id))
        .set(page_translations::title.eq(title))
        .execute(dbconn)?;
    Ok(())
}

pub fn translation_count(dbconn: &Connection) -> Result<i64, Error> {
    page_translations::table
        .count()
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn add_page_link(dbconn: &Connection, page: i32, name: &str)
-> Result<i32, Error> {
    diesel::insert_into(page_links::table)
        .values((page_links::page.eq(page), page_links::name.eq(name)))
        .returning(page_links::id)
        .get_result(dbconn)
        .map_err(From::from)
}

pub fn page_link_target(dbconn: &Connection, link: i32)
-> Result<Option<i32>, Error> {
    page_links::table
        .find(link)
        .select(page_links::page)
        .get_result(dbconn)
        .optional()
        .map_err(From::from)
}
