use std::{collections::HashMap, str::FromStr};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::Error,
    media::ImageUpload,
    schema::{Id, IngredientEntry, RecipeDraft},
};

pub type FormData = HashMap<String, Value>;

pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    /// Accepts a JSON object body; anything else is a validation error.
    pub fn from_json(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self::from_data(map.into_iter().collect())),
            _ => Err(Error::validation("Expected a JSON object")),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.get(key).is_some_and(|v| !v.is_null())
    }

    fn field(&self, key: &str) -> Result<&Value, Error> {
        match self.inner.get(key) {
            Some(Value::Null) | None => Err(Error::validation(format!("{key}: This field is required"))),
            Some(value) => Ok(value),
        }
    }

    pub fn get_value<T>(&self, key: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.field(key)?.to_owned())
            .map_err(|_e| Error::validation(format!("{key}: Invalid value")))
    }

    /// A number given either as a JSON number or as a numeric string.
    pub fn get_number<T>(&self, key: &str) -> Result<T, Error>
    where
        T: FromStr,
    {
        parse_number(self.field(key)?)
            .ok_or_else(|| Error::validation(format!("{key}: A valid integer is required")))
    }

    pub fn get_str(&self, key: &str) -> Result<String, Error> {
        match self.field(key)?.as_str() {
            Some(v) => Ok(v.trim().to_string()),
            None => Err(Error::validation(format!("{key}: Not a valid string"))),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<&Vec<Value>, Error> {
        self.field(key)?
            .as_array()
            .ok_or_else(|| Error::validation(format!("{key}: Expected a list of items")))
    }
}

fn parse_number<T: FromStr>(value: &Value) -> Option<T> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A recipe submission before its image has been stored.
#[derive(Debug, Clone)]
pub struct RecipeSubmission {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<ImageUpload>,
    pub ingredients: Vec<IngredientEntry>,
    pub tags: Vec<Id>,
}

impl RecipeSubmission {
    pub fn parse(form: &Form) -> Result<Self, Error> {
        let ingredients = form
            .get_list("ingredients")?
            .iter()
            .map(|item| {
                let id = item.get("id").and_then(parse_number);
                let amount = item.get("amount").and_then(parse_number);
                match (id, amount) {
                    (Some(id), Some(amount)) => Ok(IngredientEntry { id, amount }),
                    _ => Err(Error::validation(
                        "ingredients: Every item needs an integer id and amount",
                    )),
                }
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let tags = form
            .get_list("tags")?
            .iter()
            .map(|tag| {
                parse_number(tag).ok_or_else(|| Error::validation("tags: Expected a list of ids"))
            })
            .collect::<Result<Vec<Id>, Error>>()?;

        let image = if form.contains("image") {
            Some(ImageUpload::from_data_url(&form.get_str("image")?)?)
        } else {
            None
        };

        Ok(Self {
            name: form.get_str("name")?,
            text: form.get_str("text")?,
            cooking_time: form.get_number("cooking_time")?,
            image,
            ingredients,
            tags,
        })
    }

    /// Splits off the upload; the draft carries no image path until the
    /// upload has been stored.
    pub fn into_parts(self) -> (RecipeDraft, Option<ImageUpload>) {
        let draft = RecipeDraft {
            name: self.name,
            text: self.text,
            cooking_time: self.cooking_time,
            image: None,
            ingredients: self.ingredients,
            tags: self.tags,
        };

        (draft, self.image)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn form(value: Value) -> Form {
        Form::from_json(value).unwrap()
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        let form = form(json!({ "a": 5, "b": "7", "c": "x", "d": null }));

        assert_eq!(form.get_number::<i32>("a").unwrap(), 5);
        assert_eq!(form.get_number::<i32>("b").unwrap(), 7);
        assert!(form.get_number::<i32>("c").is_err());
        assert!(form.get_number::<i32>("d").is_err());
        assert!(form.get_number::<i32>("missing").is_err());
    }

    #[test]
    fn parses_recipe_submission() {
        let submission = RecipeSubmission::parse(&form(json!({
            "name": " Soup ",
            "text": "Boil it",
            "cooking_time": 15,
            "ingredients": [{ "id": 1, "amount": "200" }, { "id": 2, "amount": 3 }],
            "tags": [1, 2],
        })))
        .unwrap();

        assert_eq!(submission.name, "Soup");
        assert_eq!(submission.cooking_time, 15);
        assert_eq!(
            submission.ingredients,
            vec![
                IngredientEntry { id: 1, amount: 200 },
                IngredientEntry { id: 2, amount: 3 }
            ]
        );
        assert_eq!(submission.tags, vec![1, 2]);
        assert!(submission.image.is_none());
    }

    #[test]
    fn rejects_malformed_ingredients() {
        let result = RecipeSubmission::parse(&form(json!({
            "name": "Soup",
            "text": "Boil it",
            "cooking_time": 15,
            "ingredients": [{ "id": 1 }],
            "tags": [],
        })));
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = RecipeSubmission::parse(&form(json!({
            "name": "Soup",
            "text": "Boil it",
            "cooking_time": 15,
            "tags": [],
        })));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn typed_values_deserialize() {
        let form = form(json!({ "tags": ["breakfast", "lunch"], "limit": "x" }));

        let tags: Vec<String> = form.get_value("tags").unwrap();
        assert_eq!(tags, vec!["breakfast", "lunch"]);
        assert!(form.get_value::<i64>("limit").is_err());
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(Form::from_json(json!([1, 2])).is_err());
    }
}
