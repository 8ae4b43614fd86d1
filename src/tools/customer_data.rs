//! Customer personal data and representatives

use crate::tools::{
    i64_or, object_schema, required_str, str_or, BankApiClient, BankRequest, EndpointTool, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const MCD_CONSUMER_ID: &str = "AAB.SYS.021585";

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    vec![
        EndpointTool::new(
            bank,
            "get_manage_data_client",
            "Fetches the details of the customer: name, date of birth, address, email, \
             phone numbers and other personal information.",
            object_schema(json!({"user_id": {"type": "string"}}), &["user_id"]),
            build_manage_data_client,
        ),
        EndpointTool::new(
            bank,
            "validate_new_phone_number",
            "Validates a new phone number for a customer before it is changed.",
            object_schema(
                json!({
                    "international_calling_code": {"type": "string"},
                    "new_phone_number": {"type": "string"},
                    "user_id": {"type": "string"}
                }),
                &["international_calling_code", "new_phone_number", "user_id"],
            ),
            build_validate_phone_number,
        ),
        EndpointTool::new(
            bank,
            "change_phone_number",
            "Submits a mobile phone number change request for a customer.",
            object_schema(
                json!({
                    "business_contact_number": {"type": "integer"},
                    "international_calling_code": {"type": "integer", "default": 31},
                    "phone_number": {"type": "string"},
                    "formatted_phone_number": {"type": "string"},
                    "country_code": {"type": "string", "default": "NL"},
                    "client_type": {"type": "string", "default": "PRIVATE_BUSINESS_CONTACT"}
                }),
                &["business_contact_number", "phone_number", "formatted_phone_number"],
            ),
            build_change_phone_number,
        ),
        EndpointTool::new(
            bank,
            "customer_representatives",
            "Fetches the business contacts of the customer, including bcNumber, shortName, \
             serviceSegment, clientGroupCode (cgc) and appearanceType.",
            object_schema(json!({}), &[]),
            build_customer_representatives,
        ),
    ]
}

fn build_manage_data_client(args: &Value) -> Result<BankRequest> {
    let user_id = required_str(args, "user_id")?;
    Ok(
        BankRequest::get(format!("/my-abnamro/manage-data/api/clients/v2/{}", user_id))
            .header("mcd-consumer-id", MCD_CONSUMER_ID)
            .header("pii-user-id", user_id),
    )
}

fn build_validate_phone_number(args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get("/my-abnamro/manage-data/api/phonenumbers/v1")
        .query("userIdType", "CUSTOMER_ID")
        .header("mcd-consumer-id", MCD_CONSUMER_ID)
        .header(
            "pii-international-calling-code",
            required_str(args, "international_calling_code")?,
        )
        .header("pii-phone-number", required_str(args, "new_phone_number")?)
        .header("pii-user-id", required_str(args, "user_id")?))
}

fn build_change_phone_number(args: &Value) -> Result<BankRequest> {
    let business_contact_number = crate::tools::required_i64(args, "business_contact_number")?;

    Ok(BankRequest::post(
        "/my-abnamro/apis/pact/individual-party-phone-update-requests/v1/",
    )
    .header("x-xsrf-header", "token")
    .json(json!({
        "subjectBusinessContacts": [{
            "clientType": str_or(args, "client_type", "PRIVATE_BUSINESS_CONTACT"),
            "businessContactNumber": business_contact_number,
            "phoneNumbers": {
                "landLinePhoneNumbers": [{"formattedPhoneNumber": ""}],
                "mobilePhoneNumbers": [{
                    "country": {"countryCode": str_or(args, "country_code", "NL")},
                    "internationalCallingCode": i64_or(args, "international_calling_code", 31),
                    "phoneNumber": required_str(args, "phone_number")?,
                    "formattedPhoneNumber": required_str(args, "formatted_phone_number")?
                }]
            }
        }]
    })))
}

fn build_customer_representatives(_args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get(
        "/representatives/representative/customers/v4",
    ))
}
